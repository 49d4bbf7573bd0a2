//! Sorts several file-backed runs concurrently, sizing each run from a fixed
//! memory budget and scheduling one job per run.

use std::sync::Mutex;

use rand::prelude::*;

use run_sort::{Job, JobManager, OrdSorter, RmpFileStream, RunStream, Work};

struct SortRun {
    sorter: Mutex<OrdSorter<i64>>,
    stream: Mutex<RmpFileStream<i64>>,
    item_count: usize,
}

impl Work for SortRun {
    fn run(&self) {
        let mut sorter = self.sorter.lock().unwrap();
        let mut stream = self.stream.lock().unwrap();
        sorter
            .sort_in_place(&mut *stream, self.item_count, None)
            .unwrap();
    }

    fn on_done(&self) {
        log::debug!("run of {} items sorted", self.item_count);
    }
}

fn main() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Debug)
        .init();

    let budget = 64 * 1024; // bytes per run
    let probe: OrdSorter<i64> = OrdSorter::new();
    let run_length = probe.max_item_count(budget);
    log::info!("{} items fit in a {} byte run", run_length, budget);

    let mut rng = rand::thread_rng();
    let jobs: Vec<_> = (0..8)
        .map(|_| {
            let mut stream = RmpFileStream::create().unwrap();
            for _ in 0..run_length {
                stream.write(&rng.gen_range(0i64..1_000_000)).unwrap();
            }
            stream.seek(0).unwrap();

            let mut sorter = OrdSorter::new();
            sorter.allocate(run_length);

            Job::new(SortRun {
                sorter: Mutex::new(sorter),
                stream: Mutex::new(stream),
                item_count: run_length,
            })
        })
        .collect();

    let manager = JobManager::with_default_workers().unwrap();
    for job in &jobs {
        manager.enqueue(job, None);
    }
    for job in &jobs {
        job.join();
    }
    manager.finish();

    log::info!("sorted {} runs", jobs.len());
}
