//! `run-sort` provides the bounded-memory building blocks of external-memory
//! data processing: in-memory run sorters that read, sort and write one
//! memory-sized chunk of a stream at a time, and a dependency-tracked job
//! scheduler that executes such bounded work units across a worker thread
//! pool. Together they form the "sort one bounded run" half of an external
//! merge sort; the multi-way merge pass belongs to a surrounding layer. For
//! more information see [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! `run-sort` supports the following features:
//!
//! * **Three interchangeable sort strategies:**
//!   sort by the item's natural ordering, by a caller-supplied comparison
//!   function, or by a small extracted key through an indirection array that
//!   never moves the full records during comparisons and swaps.
//! * **Memory budgeting:**
//!   every sorter reports its per-item and fixed memory cost, so a caller
//!   can compute how many items fit in a byte budget before allocating.
//! * **Stream agnostic:**
//!   runs are read from and written to anything implementing the small
//!   [`RunStream`] contract; an in-memory stream and a MessagePack-encoded
//!   temporary-file stream are included.
//! * **Job scheduling:**
//!   independent runs can be wrapped in [`Job`]s and executed concurrently
//!   by a fixed worker pool, with parent jobs blocking on their subjobs
//!   through a dependency count.
//! * **Progress reporting:**
//!   the read, sort and write phases are reported through a minimal
//!   [`Progress`] contract as weighted sub-ranges of one indicator.
//!
//! # Example
//!
//! Sorting one bounded run between two streams:
//!
//! ```
//! use run_sort::{OrdSorter, VecStream};
//!
//! let mut input = VecStream::from_items(vec![5, 3, 1, 4, 2]);
//! let mut output: VecStream<i32> = VecStream::new();
//!
//! let mut sorter = OrdSorter::new();
//! sorter.allocate(5);
//! sorter.sort(&mut input, &mut output, 5, None).unwrap();
//! sorter.deallocate();
//!
//! assert_eq!(output.items(), &[1, 2, 3, 4, 5]);
//! ```
//!
//! Scheduling bounded work units across a worker pool:
//!
//! ```
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! use run_sort::{Job, JobManager, Work};
//!
//! struct Count(Arc<AtomicUsize>);
//!
//! impl Work for Count {
//!     fn run(&self) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let manager = JobManager::new(2).unwrap();
//! let counter = Arc::new(AtomicUsize::new(0));
//!
//! let jobs: Vec<_> = (0..16).map(|_| Job::new(Count(Arc::clone(&counter)))).collect();
//! for job in &jobs {
//!     manager.enqueue(job, None);
//! }
//! for job in &jobs {
//!     job.join();
//! }
//!
//! assert_eq!(counter.load(Ordering::SeqCst), 16);
//! manager.finish();
//! ```

pub mod buffer;
pub mod job;
pub mod progress;
pub mod sort;
pub mod stream;

pub use buffer::RunBuffer;
pub use job::{default_worker_count, Job, JobManager, Work};
pub use progress::{NoProgress, Progress};
pub use sort::{FnSorter, KeySorter, OrdSorter, SortError};
pub use stream::{RmpFileStream, RunStream, StreamError, VecStream};
