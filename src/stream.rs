//! Sequential item streams.
//!
//! A [`RunStream`] is the storage collaborator of the run sorters: a sequential
//! stream of items supporting positioned reads, writes, seeking and
//! truncation. The sorters rely on nothing else, so any storage that can
//! provide these four operations can back a run.
//!
//! Two implementations are provided: [`VecStream`] keeps items in memory and is
//! mainly useful for tests and small data, [`RmpFileStream`] serializes items
//! to a temporary file using the MessagePack format.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::marker::PhantomData;
use std::path::Path;

/// Stream operation error.
#[derive(Debug)]
pub enum StreamError {
    /// Read past the last item of the stream.
    EndOfStream,
    /// Seek to a position past the last item of the stream.
    OutOfBounds,
    /// Common I/O error.
    IO(io::Error),
    /// Item serialization error.
    SerializationError(rmp_serde::encode::Error),
    /// Item deserialization error.
    DeserializationError(rmp_serde::decode::Error),
}

impl Error for StreamError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            StreamError::EndOfStream => None,
            StreamError::OutOfBounds => None,
            StreamError::IO(err) => Some(err),
            StreamError::SerializationError(err) => Some(err),
            StreamError::DeserializationError(err) => Some(err),
        }
    }
}

impl Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            StreamError::EndOfStream => write!(f, "read past the end of the stream"),
            StreamError::OutOfBounds => write!(f, "position is past the end of the stream"),
            StreamError::IO(err) => write!(f, "I/O operation failed: {}", err),
            StreamError::SerializationError(err) => write!(f, "item serialization error: {}", err),
            StreamError::DeserializationError(err) => write!(f, "item deserialization error: {}", err),
        }
    }
}

/// Sequential stream of items. Positions are counted in items, not bytes.
pub trait RunStream<T> {
    type Error: Error;

    /// Reads the item at the current position and advances past it.
    fn read(&mut self) -> Result<T, Self::Error>;

    /// Writes an item at the current position and advances past it.
    fn write(&mut self, item: &T) -> Result<(), Self::Error>;

    /// Moves the current position to `position`.
    fn seek(&mut self, position: u64) -> Result<(), Self::Error>;

    /// Discards all items beyond the first `length`. The current position is
    /// clamped to the new length.
    fn truncate(&mut self, length: u64) -> Result<(), Self::Error>;
}

/// In-memory stream backed by a `Vec`.
pub struct VecStream<T> {
    items: Vec<T>,
    position: usize,
}

impl<T> VecStream<T> {
    /// Creates an empty stream.
    pub fn new() -> Self {
        VecStream {
            items: Vec::new(),
            position: 0,
        }
    }

    /// Creates a stream holding `items`, positioned at the first one.
    pub fn from_items(items: Vec<T>) -> Self {
        VecStream { items, position: 0 }
    }

    /// Number of items in the stream.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the stream holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All items currently in the stream, in stream order.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Consumes the stream, returning its items.
    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

impl<T> Default for VecStream<T> {
    fn default() -> Self {
        VecStream::new()
    }
}

impl<T: Clone> RunStream<T> for VecStream<T> {
    type Error = StreamError;

    fn read(&mut self) -> Result<T, StreamError> {
        let item = self
            .items
            .get(self.position)
            .cloned()
            .ok_or(StreamError::EndOfStream)?;
        self.position += 1;
        Ok(item)
    }

    fn write(&mut self, item: &T) -> Result<(), StreamError> {
        if self.position < self.items.len() {
            self.items[self.position] = item.clone();
        } else {
            self.items.push(item.clone());
        }
        self.position += 1;
        Ok(())
    }

    fn seek(&mut self, position: u64) -> Result<(), StreamError> {
        if position as usize > self.items.len() {
            return Err(StreamError::OutOfBounds);
        }
        self.position = position as usize;
        Ok(())
    }

    fn truncate(&mut self, length: u64) -> Result<(), StreamError> {
        let length = length as usize;
        if length < self.items.len() {
            self.items.truncate(length);
        }
        self.position = self.position.min(self.items.len());
        Ok(())
    }
}

/// File-backed stream serializing items with MessagePack.
///
/// Items are variable-length records, so the byte offset of every item is kept
/// in memory. Writing anywhere but the end discards the items from the current
/// position on; with variable-length records an overwritten tail cannot be
/// preserved.
pub struct RmpFileStream<T> {
    file: fs::File,
    /// Byte offset of each item in the file.
    offsets: Vec<u64>,
    /// Byte length of the valid data.
    end: u64,
    position: usize,

    item_type: PhantomData<T>,
}

impl<T> RmpFileStream<T> {
    /// Creates an empty stream backed by a new temporary file in the OS
    /// temporary directory.
    pub fn create() -> Result<Self, StreamError> {
        let file = tempfile::tempfile().map_err(StreamError::IO)?;
        Ok(Self::from_file(file))
    }

    /// Creates an empty stream backed by a new temporary file inside `dir`.
    pub fn create_in(dir: &Path) -> Result<Self, StreamError> {
        let file = tempfile::tempfile_in(dir).map_err(StreamError::IO)?;
        Ok(Self::from_file(file))
    }

    fn from_file(file: fs::File) -> Self {
        RmpFileStream {
            file,
            offsets: Vec::new(),
            end: 0,
            position: 0,
            item_type: PhantomData,
        }
    }

    /// Number of items in the stream.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Returns `true` if the stream holds no items.
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

impl<T> RunStream<T> for RmpFileStream<T>
where
    T: serde::ser::Serialize + serde::de::DeserializeOwned,
{
    type Error = StreamError;

    fn read(&mut self) -> Result<T, StreamError> {
        let offset = *self.offsets.get(self.position).ok_or(StreamError::EndOfStream)?;
        self.file
            .seek(io::SeekFrom::Start(offset))
            .map_err(StreamError::IO)?;
        let item =
            rmp_serde::decode::from_read(&mut self.file).map_err(StreamError::DeserializationError)?;
        self.position += 1;
        Ok(item)
    }

    fn write(&mut self, item: &T) -> Result<(), StreamError> {
        if self.position < self.offsets.len() {
            let offset = self.offsets[self.position];
            self.offsets.truncate(self.position);
            self.file.set_len(offset).map_err(StreamError::IO)?;
            self.end = offset;
        }
        self.file
            .seek(io::SeekFrom::Start(self.end))
            .map_err(StreamError::IO)?;
        rmp_serde::encode::write(&mut self.file, item).map_err(StreamError::SerializationError)?;
        self.offsets.push(self.end);
        self.end = self.file.stream_position().map_err(StreamError::IO)?;
        self.position += 1;
        Ok(())
    }

    fn seek(&mut self, position: u64) -> Result<(), StreamError> {
        if position as usize > self.offsets.len() {
            return Err(StreamError::OutOfBounds);
        }
        self.position = position as usize;
        Ok(())
    }

    fn truncate(&mut self, length: u64) -> Result<(), StreamError> {
        let length = length as usize;
        if length < self.offsets.len() {
            let end = self.offsets[length];
            self.offsets.truncate(length);
            self.file.set_len(end).map_err(StreamError::IO)?;
            self.end = end;
        }
        self.position = self.position.min(self.offsets.len());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use rstest::*;
    use serde::{Deserialize, Serialize};

    use super::{RmpFileStream, RunStream, StreamError, VecStream};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Record {
        key: u32,
        payload: String,
    }

    #[test]
    fn test_vec_stream_round_trip() {
        let mut stream = VecStream::new();

        for item in 0..5 {
            stream.write(&item).unwrap();
        }
        stream.seek(0).unwrap();

        let restored: Vec<i32> = (0..5).map(|_| stream.read().unwrap()).collect();
        assert_eq!(restored, vec![0, 1, 2, 3, 4]);
        assert!(matches!(stream.read(), Err(StreamError::EndOfStream)));
    }

    #[test]
    fn test_vec_stream_truncate() {
        let mut stream = VecStream::from_items(vec![0, 1, 2, 3, 4]);

        stream.seek(4).unwrap();
        stream.truncate(2).unwrap();

        assert_eq!(stream.len(), 2);
        assert_eq!(stream.items(), &[0, 1]);
        // position was clamped to the new length
        assert!(matches!(stream.read(), Err(StreamError::EndOfStream)));
    }

    #[test]
    fn test_vec_stream_seek_out_of_bounds() {
        let mut stream = VecStream::from_items(vec![0, 1, 2]);
        assert!(matches!(stream.seek(4), Err(StreamError::OutOfBounds)));
    }

    #[fixture]
    fn records() -> Vec<Record> {
        vec![
            Record {
                key: 3,
                payload: "c".to_string(),
            },
            Record {
                key: 1,
                payload: "a".to_string(),
            },
            Record {
                key: 2,
                payload: "b".to_string(),
            },
        ]
    }

    #[rstest]
    fn test_file_stream_round_trip(records: Vec<Record>) {
        let mut stream = RmpFileStream::create().unwrap();

        for record in &records {
            stream.write(record).unwrap();
        }
        assert_eq!(stream.len(), records.len());

        stream.seek(0).unwrap();
        let restored: Vec<Record> = (0..records.len()).map(|_| stream.read().unwrap()).collect();
        assert_eq!(restored, records);
        assert!(matches!(stream.read(), Err(StreamError::EndOfStream)));
    }

    #[rstest]
    fn test_file_stream_truncate_and_rewrite(records: Vec<Record>) {
        let mut stream = RmpFileStream::create().unwrap();

        for record in &records {
            stream.write(record).unwrap();
        }

        stream.truncate(0).unwrap();
        stream.seek(0).unwrap();
        assert!(stream.is_empty());

        for record in &records {
            stream.write(record).unwrap();
        }
        stream.seek(0).unwrap();

        let restored: Vec<Record> = (0..records.len()).map(|_| stream.read().unwrap()).collect();
        assert_eq!(restored, records);
    }

    #[rstest]
    fn test_file_stream_overwrite_discards_tail(records: Vec<Record>) {
        let mut stream = RmpFileStream::create().unwrap();

        for record in &records {
            stream.write(record).unwrap();
        }

        let replacement = Record {
            key: 9,
            payload: "z".to_string(),
        };
        stream.seek(1).unwrap();
        stream.write(&replacement).unwrap();

        assert_eq!(stream.len(), 2);
        stream.seek(0).unwrap();
        assert_eq!(stream.read().unwrap(), records[0]);
        assert_eq!(stream.read().unwrap(), replacement);
    }
}
