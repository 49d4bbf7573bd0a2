//! Bounded-memory run sorters.
//!
//! A run sorter reads a bounded run of items from an input stream into a
//! preallocated [`RunBuffer`], orders it in memory and writes it back out,
//! reporting the read, sort and write phases through an optional [`Progress`]
//! indicator. Repeatedly sorting runs this way is the first pass of an
//! external merge sort; the merge pass itself is outside the scope of this
//! crate.
//!
//! Three sorters share the same protocol:
//!
//! * [`OrdSorter`] orders items by their natural [`Ord`] ordering.
//! * [`FnSorter`] orders items with a caller-supplied comparison function.
//! * [`KeySorter`] extracts a small key per item and orders an indirection
//!   array of (key, source index) pairs instead of the items themselves,
//!   which avoids moving large records during comparisons and swaps.
//!
//! A sorter must be `allocate`d before its first sort call. The capacity is
//! meant to be computed from a memory budget up front via `max_item_count`;
//! the buffer never grows during a sort, and a run larger than the capacity
//! is a programming error. The sort phase is parallelized across threads for
//! large runs and is not stable: items comparing equal may be reordered.
//!
//! When a run is both read from and written to the same stream, use
//! `sort_in_place`: after the read phase the stream is truncated to empty and
//! rewound, so the write phase reuses its storage without colliding with the
//! just-read data.

use std::cmp::Ordering;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::mem;

use rayon::prelude::*;

use crate::buffer::{self, RunBuffer};
use crate::progress::{Progress, RunProgress};
use crate::stream::RunStream;

/// Sorting error.
#[derive(Debug)]
pub enum SortError<R: Error, W: Error> {
    /// The sorter was used before `allocate` was called.
    Uninitialized,
    /// Input stream failure during the read phase.
    ReadError(R),
    /// Output stream failure during the write phase.
    WriteError(W),
}

impl<R, W> Error for SortError<R, W>
where
    R: Error + 'static,
    W: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::Uninitialized => None,
            SortError::ReadError(err) => Some(err),
            SortError::WriteError(err) => Some(err),
        }
    }
}

impl<R: Error, W: Error> Display for SortError<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::Uninitialized => write!(f, "sorter used before allocation"),
            SortError::ReadError(err) => write!(f, "input stream read failed: {}", err),
            SortError::WriteError(err) => write!(f, "output stream write failed: {}", err),
        }
    }
}

const READ_PHASE: &str = "Reading";
const SORT_PHASE: &str = "Sorting";
const WRITE_PHASE: &str = "Writing";
const PHASES: u64 = 3;

/// An overfull run is a programming error, not a recoverable condition.
fn assert_run_fits(capacity: usize, item_count: usize) {
    assert!(
        item_count <= capacity,
        "run of {} items overflows a buffer of {} items",
        item_count,
        capacity
    );
}

/// Read phase: fills the buffer with `item_count` items from the stream's
/// current position.
fn read_run<T, S>(
    buffer: &mut RunBuffer<T>,
    input: &mut S,
    item_count: usize,
    progress: &mut RunProgress<'_>,
) -> Result<(), S::Error>
where
    S: RunStream<T>,
{
    let mut phase = progress.phase(READ_PHASE, item_count as u64);
    buffer.clear();
    for _ in 0..item_count {
        buffer.push(input.read()?);
        phase.step();
    }
    phase.done();
    Ok(())
}

/// Sort phase for the direct variants: orders the buffered items themselves.
fn sort_items<T, F>(items: &mut [T], compare: &F, progress: &mut RunProgress<'_>)
where
    T: Send,
    F: Fn(&T, &T) -> Ordering + Sync,
{
    let phase = progress.phase(SORT_PHASE, items.len() as u64);
    items.par_sort_unstable_by(|left, right| compare(left, right));
    phase.done();
}

/// Write phase: writes the items to the stream's current position in the
/// order the iterator yields them.
fn write_run<'a, T, S, I>(
    items: I,
    output: &mut S,
    item_count: usize,
    progress: &mut RunProgress<'_>,
) -> Result<(), S::Error>
where
    T: 'a,
    S: RunStream<T>,
    I: IntoIterator<Item = &'a T>,
{
    let mut phase = progress.phase(WRITE_PHASE, item_count as u64);
    for item in items {
        output.write(item)?;
        phase.step();
    }
    phase.done();
    Ok(())
}

/// Empties a stream that is both the source and the destination of a run, so
/// the write phase can reuse its storage from position 0.
fn reset_for_rewrite<T, S: RunStream<T>>(stream: &mut S) -> Result<(), S::Error> {
    stream.truncate(0)?;
    stream.seek(0)
}

/// Run sorter ordering items by their natural ordering.
pub struct OrdSorter<T> {
    buffer: RunBuffer<T>,
}

impl<T> OrdSorter<T>
where
    T: Ord + Send,
{
    /// Creates an unallocated sorter.
    pub fn new() -> Self {
        OrdSorter {
            buffer: RunBuffer::new(),
        }
    }

    /// Ensures buffer storage for runs of up to `item_count` items.
    pub fn allocate(&mut self, item_count: usize) {
        self.buffer.allocate(item_count);
    }

    /// Releases the buffer storage.
    pub fn deallocate(&mut self) {
        self.buffer.deallocate();
    }

    /// Allocated capacity in items.
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Memory usage in bytes per sort item.
    pub fn space_per_item(&self) -> usize {
        mem::size_of::<T>()
    }

    /// Fixed memory usage in bytes, independent of the item count.
    pub fn space_overhead(&self) -> usize {
        0
    }

    /// Maximum number of items that can be sorted using `budget` bytes.
    pub fn max_item_count(&self, budget: usize) -> usize {
        buffer::max_item_count(budget, self.space_per_item(), self.space_overhead())
    }

    /// Reads `item_count` items from `input` starting at its current
    /// position, sorts them and writes them to `output` in non-decreasing
    /// order.
    pub fn sort<R, W>(
        &mut self,
        input: &mut R,
        output: &mut W,
        item_count: usize,
        progress: Option<&mut dyn Progress>,
    ) -> Result<(), SortError<R::Error, W::Error>>
    where
        R: RunStream<T>,
        W: RunStream<T>,
    {
        if !self.buffer.is_allocated() {
            return Err(SortError::Uninitialized);
        }
        assert_run_fits(self.buffer.capacity(), item_count);
        let mut fp = RunProgress::new(progress, PHASES, item_count as u64);

        read_run(&mut self.buffer, input, item_count, &mut fp).map_err(SortError::ReadError)?;
        sort_items(self.buffer.as_mut_slice(), &|a: &T, b: &T| a.cmp(b), &mut fp);
        write_run(self.buffer.as_slice(), output, item_count, &mut fp).map_err(SortError::WriteError)?;

        fp.done();
        Ok(())
    }

    /// Sorts a run of `stream` in place: the stream is both the source and
    /// the destination, and its prior contents are discarded after the read
    /// phase.
    pub fn sort_in_place<S>(
        &mut self,
        stream: &mut S,
        item_count: usize,
        progress: Option<&mut dyn Progress>,
    ) -> Result<(), SortError<S::Error, S::Error>>
    where
        S: RunStream<T>,
    {
        if !self.buffer.is_allocated() {
            return Err(SortError::Uninitialized);
        }
        assert_run_fits(self.buffer.capacity(), item_count);
        let mut fp = RunProgress::new(progress, PHASES, item_count as u64);

        read_run(&mut self.buffer, stream, item_count, &mut fp).map_err(SortError::ReadError)?;
        sort_items(self.buffer.as_mut_slice(), &|a: &T, b: &T| a.cmp(b), &mut fp);
        reset_for_rewrite(stream).map_err(SortError::WriteError)?;
        write_run(self.buffer.as_slice(), stream, item_count, &mut fp).map_err(SortError::WriteError)?;

        fp.done();
        Ok(())
    }
}

impl<T> Default for OrdSorter<T>
where
    T: Ord + Send,
{
    fn default() -> Self {
        OrdSorter::new()
    }
}

/// Run sorter ordering items with a caller-supplied comparison function.
pub struct FnSorter<T, F> {
    buffer: RunBuffer<T>,
    compare: F,
}

impl<T, F> FnSorter<T, F>
where
    T: Send,
    F: Fn(&T, &T) -> Ordering + Sync,
{
    /// Creates an unallocated sorter ordering items with `compare`.
    pub fn new(compare: F) -> Self {
        FnSorter {
            buffer: RunBuffer::new(),
            compare,
        }
    }

    /// Ensures buffer storage for runs of up to `item_count` items.
    pub fn allocate(&mut self, item_count: usize) {
        self.buffer.allocate(item_count);
    }

    /// Releases the buffer storage.
    pub fn deallocate(&mut self) {
        self.buffer.deallocate();
    }

    /// Allocated capacity in items.
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Memory usage in bytes per sort item.
    pub fn space_per_item(&self) -> usize {
        mem::size_of::<T>()
    }

    /// Fixed memory usage in bytes, independent of the item count.
    pub fn space_overhead(&self) -> usize {
        0
    }

    /// Maximum number of items that can be sorted using `budget` bytes.
    pub fn max_item_count(&self, budget: usize) -> usize {
        buffer::max_item_count(budget, self.space_per_item(), self.space_overhead())
    }

    /// Reads `item_count` items from `input` starting at its current
    /// position, sorts them and writes them to `output` in non-decreasing
    /// order per the comparison function.
    pub fn sort<R, W>(
        &mut self,
        input: &mut R,
        output: &mut W,
        item_count: usize,
        progress: Option<&mut dyn Progress>,
    ) -> Result<(), SortError<R::Error, W::Error>>
    where
        R: RunStream<T>,
        W: RunStream<T>,
    {
        if !self.buffer.is_allocated() {
            return Err(SortError::Uninitialized);
        }
        assert_run_fits(self.buffer.capacity(), item_count);
        let FnSorter { buffer, compare } = self;
        let mut fp = RunProgress::new(progress, PHASES, item_count as u64);

        read_run(buffer, input, item_count, &mut fp).map_err(SortError::ReadError)?;
        sort_items(buffer.as_mut_slice(), compare, &mut fp);
        write_run(buffer.as_slice(), output, item_count, &mut fp).map_err(SortError::WriteError)?;

        fp.done();
        Ok(())
    }

    /// Sorts a run of `stream` in place: the stream is both the source and
    /// the destination, and its prior contents are discarded after the read
    /// phase.
    pub fn sort_in_place<S>(
        &mut self,
        stream: &mut S,
        item_count: usize,
        progress: Option<&mut dyn Progress>,
    ) -> Result<(), SortError<S::Error, S::Error>>
    where
        S: RunStream<T>,
    {
        if !self.buffer.is_allocated() {
            return Err(SortError::Uninitialized);
        }
        assert_run_fits(self.buffer.capacity(), item_count);
        let FnSorter { buffer, compare } = self;
        let mut fp = RunProgress::new(progress, PHASES, item_count as u64);

        read_run(buffer, stream, item_count, &mut fp).map_err(SortError::ReadError)?;
        sort_items(buffer.as_mut_slice(), compare, &mut fp);
        reset_for_rewrite(stream).map_err(SortError::WriteError)?;
        write_run(buffer.as_slice(), stream, item_count, &mut fp).map_err(SortError::WriteError)?;

        fp.done();
        Ok(())
    }
}

/// Extracted key and the buffer position of its full record.
struct KeyEntry<K> {
    key: K,
    source: usize,
}

/// Sort phase for the key-indirection variant: rebuilds and orders the
/// indirection array, leaving the record buffer untouched.
fn sort_keys<T, K, E, C>(
    items: &[T],
    entries: &mut Vec<KeyEntry<K>>,
    extract: &E,
    compare: &C,
    progress: &mut RunProgress<'_>,
) where
    K: Send,
    E: Fn(&T) -> K,
    C: Fn(&K, &K) -> Ordering + Sync,
{
    let phase = progress.phase(SORT_PHASE, items.len() as u64);
    entries.clear();
    entries.extend(
        items
            .iter()
            .enumerate()
            .map(|(source, item)| KeyEntry {
                key: extract(item),
                source,
            }),
    );
    entries.par_sort_unstable_by(|left, right| compare(&left.key, &right.key));
    phase.done();
}

/// Run sorter ordering records through a key indirection array.
///
/// `extract` pulls a small key out of each record and `compare` orders keys.
/// Sorting permutes only the (key, source index) pairs; the record buffer is
/// never reordered. The write phase follows the sorted pairs and fetches each
/// record from its original buffer position, so the output carries the full
/// records in key order.
pub struct KeySorter<T, K, E, C> {
    buffer: RunBuffer<T>,
    entries: Vec<KeyEntry<K>>,
    extract: E,
    compare: C,
}

impl<T, K, E, C> KeySorter<T, K, E, C>
where
    T: Send,
    K: Send,
    E: Fn(&T) -> K,
    C: Fn(&K, &K) -> Ordering + Sync,
{
    /// Creates an unallocated sorter using `extract` to pull keys out of
    /// records and `compare` to order keys.
    pub fn new(extract: E, compare: C) -> Self {
        KeySorter {
            buffer: RunBuffer::new(),
            entries: Vec::new(),
            extract,
            compare,
        }
    }

    /// Ensures storage for runs of up to `item_count` records and their
    /// indirection entries.
    pub fn allocate(&mut self, item_count: usize) {
        self.buffer.allocate(item_count);
        self.entries = Vec::with_capacity(item_count);
    }

    /// Releases the record and indirection storage.
    pub fn deallocate(&mut self) {
        self.buffer.deallocate();
        self.entries = Vec::new();
    }

    /// Allocated capacity in items.
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Memory usage in bytes per sort item. Covers both the record and its
    /// indirection entry, which are held simultaneously.
    pub fn space_per_item(&self) -> usize {
        mem::size_of::<T>() + mem::size_of::<KeyEntry<K>>()
    }

    /// Fixed memory usage in bytes, independent of the item count.
    pub fn space_overhead(&self) -> usize {
        0
    }

    /// Maximum number of items that can be sorted using `budget` bytes.
    pub fn max_item_count(&self, budget: usize) -> usize {
        buffer::max_item_count(budget, self.space_per_item(), self.space_overhead())
    }

    /// Reads `item_count` records from `input` starting at its current
    /// position, sorts them by key and writes them to `output` in
    /// non-decreasing key order.
    pub fn sort<R, W>(
        &mut self,
        input: &mut R,
        output: &mut W,
        item_count: usize,
        progress: Option<&mut dyn Progress>,
    ) -> Result<(), SortError<R::Error, W::Error>>
    where
        R: RunStream<T>,
        W: RunStream<T>,
    {
        if !self.buffer.is_allocated() {
            return Err(SortError::Uninitialized);
        }
        assert_run_fits(self.buffer.capacity(), item_count);
        let KeySorter {
            buffer,
            entries,
            extract,
            compare,
        } = self;
        let mut fp = RunProgress::new(progress, PHASES, item_count as u64);

        read_run(buffer, input, item_count, &mut fp).map_err(SortError::ReadError)?;
        sort_keys(buffer.as_slice(), entries, extract, compare, &mut fp);
        let items = buffer.as_slice();
        write_run(
            entries.iter().map(|entry| &items[entry.source]),
            output,
            item_count,
            &mut fp,
        )
        .map_err(SortError::WriteError)?;

        fp.done();
        Ok(())
    }

    /// Sorts a run of `stream` in place: the stream is both the source and
    /// the destination, and its prior contents are discarded after the read
    /// phase.
    pub fn sort_in_place<S>(
        &mut self,
        stream: &mut S,
        item_count: usize,
        progress: Option<&mut dyn Progress>,
    ) -> Result<(), SortError<S::Error, S::Error>>
    where
        S: RunStream<T>,
    {
        if !self.buffer.is_allocated() {
            return Err(SortError::Uninitialized);
        }
        assert_run_fits(self.buffer.capacity(), item_count);
        let KeySorter {
            buffer,
            entries,
            extract,
            compare,
        } = self;
        let mut fp = RunProgress::new(progress, PHASES, item_count as u64);

        read_run(buffer, stream, item_count, &mut fp).map_err(SortError::ReadError)?;
        sort_keys(buffer.as_slice(), entries, extract, compare, &mut fp);
        reset_for_rewrite(stream).map_err(SortError::WriteError)?;
        let items = buffer.as_slice();
        write_run(
            entries.iter().map(|entry| &items[entry.source]),
            stream,
            item_count,
            &mut fp,
        )
        .map_err(SortError::WriteError)?;

        fp.done();
        Ok(())
    }
}
