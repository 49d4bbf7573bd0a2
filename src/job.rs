//! Dependency-tracked jobs and the worker pool that executes them.
//!
//! A [`Job`] wraps a unit of [`Work`] together with a completion dependency
//! count. Jobs are enqueued into a [`JobManager`], optionally under a parent
//! job; the parent does not report done until its own work and every subjob
//! have finished. Completion propagates exactly one level up the parent
//! link, so the dependency structure is a shallow forest of one-level groups
//! rather than an arbitrary DAG.
//!
//! The manager owns a fixed pool of worker threads pulling jobs from a
//! shared queue. Its lifetime is owned by the embedding application:
//! construct it at startup, pass it by reference wherever jobs are enqueued
//! and drop it (or call [`finish`](JobManager::finish)) at shutdown.
//! Dropping drains the queue and joins the workers.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use log;

/// A unit of schedulable work.
///
/// [`run`](Work::run) is invoked on a worker thread exactly once per
/// enqueue. It is expected not to panic: a panicking work call takes its
/// worker thread down without corrupting the bookkeeping of other jobs, so
/// work that can fail should capture the failure itself and surface it after
/// [`Job::join`] returns.
pub trait Work: Send + Sync {
    /// Performs the work. Called by a worker thread.
    fn run(&self);

    /// Called exactly once when the job and all its subjobs are done.
    fn on_done(&self) {}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum JobState {
    Idle,
    Enqueued,
    Running,
}

struct JobInner {
    /// Outstanding completions: the job's own run plus unfinished subjobs.
    dependencies: usize,
    state: JobState,
    parent: Option<Arc<Job>>,
}

/// A schedulable unit of work with a completion dependency count.
///
/// A job is idle when created, enqueued once submitted, running while a
/// worker executes it and idle again once it and all its subjobs are done,
/// at which point it may be enqueued again.
pub struct Job {
    work: Box<dyn Work>,
    inner: Mutex<JobInner>,
    completed: Condvar,
}

impl Job {
    /// Creates an idle job that executes `work` when enqueued.
    pub fn new(work: impl Work + 'static) -> Arc<Job> {
        Arc::new(Job {
            work: Box::new(work),
            inner: Mutex::new(JobInner {
                dependencies: 0,
                state: JobState::Idle,
                parent: None,
            }),
            completed: Condvar::new(),
        })
    }

    /// Returns `true` if the job and all its subjobs are done.
    pub fn is_done(&self) -> bool {
        self.inner.lock().unwrap().dependencies == 0
    }

    /// Blocks the calling thread until the job and all its subjobs are done.
    ///
    /// Must not be called from a worker thread: a worker waiting for another
    /// queued job can deadlock the pool.
    pub fn join(&self) {
        let mut inner = self.inner.lock().unwrap();
        while inner.dependencies > 0 {
            inner = self.completed.wait(inner).unwrap();
        }
    }

    /// Executes the work call and the completion bookkeeping. Called by
    /// worker threads only.
    fn run(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            assert_eq!(
                inner.state,
                JobState::Enqueued,
                "job run outside the enqueued state"
            );
            inner.state = JobState::Running;
        }
        self.work.run();
        self.done();
    }

    /// Marks one dependency as completed. On the last one the job becomes
    /// idle again, the `on_done` hook fires, joiners are woken and the
    /// completion propagates to the parent, if any.
    fn done(&self) {
        let parent = {
            let mut inner = self.inner.lock().unwrap();
            inner.dependencies -= 1;
            if inner.dependencies > 0 {
                return;
            }
            inner.state = JobState::Idle;
            inner.parent.take()
        };
        self.work.on_done();
        self.completed.notify_all();
        if let Some(parent) = parent {
            parent.done();
        }
    }
}

struct JobQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

struct QueueState {
    jobs: VecDeque<Arc<Job>>,
    shutdown: bool,
}

/// Fixed-size worker thread pool executing enqueued jobs.
pub struct JobManager {
    queue: Arc<JobQueue>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl JobManager {
    /// Starts a pool of `worker_count` worker threads.
    pub fn new(worker_count: usize) -> io::Result<JobManager> {
        log::info!("starting job manager ({} workers)", worker_count);

        let queue = Arc::new(JobQueue {
            state: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                shutdown: false,
            }),
            available: Condvar::new(),
        });

        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let queue = Arc::clone(&queue);
            let handle = thread::Builder::new()
                .name(format!("job-worker-{}", index))
                .spawn(move || worker_loop(&queue))?;
            workers.push(handle);
        }

        return Ok(JobManager { queue, workers });
    }

    /// Starts a pool sized by [`default_worker_count`].
    pub fn with_default_workers() -> io::Result<JobManager> {
        JobManager::new(default_worker_count())
    }

    /// Number of worker threads in the pool.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Submits `job` to the queue. The job must be idle.
    ///
    /// If `parent` is given, the parent's dependency count is raised before
    /// submission: the parent will not report done until this job has
    /// finished. A job may be enqueued again once it is done.
    pub fn enqueue(&self, job: &Arc<Job>, parent: Option<&Arc<Job>>) {
        if let Some(parent) = parent {
            parent.inner.lock().unwrap().dependencies += 1;
        }
        {
            let mut inner = job.inner.lock().unwrap();
            assert_eq!(
                inner.state,
                JobState::Idle,
                "job is already enqueued or running"
            );
            inner.state = JobState::Enqueued;
            inner.dependencies += 1;
            inner.parent = parent.map(Arc::clone);
        }

        let mut state = self.queue.state.lock().unwrap();
        assert!(!state.shutdown, "job enqueued after the job manager finished");
        state.jobs.push_back(Arc::clone(job));
        drop(state);
        self.queue.available.notify_one();
    }

    /// Stops the workers once the queue is drained and joins their threads.
    ///
    /// Dropping the manager does the same; `finish` only makes the shutdown
    /// point explicit. Enqueuing through a finished manager is impossible by
    /// construction, since `finish` consumes it.
    pub fn finish(self) {}
}

impl Drop for JobManager {
    fn drop(&mut self) {
        {
            let mut state = self.queue.state.lock().unwrap();
            state.shutdown = true;
        }
        self.queue.available.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        log::info!("job manager finished");
    }
}

fn worker_loop(queue: &JobQueue) {
    loop {
        let job = {
            let mut state = queue.state.lock().unwrap();
            loop {
                if let Some(job) = state.jobs.pop_front() {
                    break job;
                }
                if state.shutdown {
                    return;
                }
                state = queue.available.wait(state).unwrap();
            }
        };
        job.run();
    }
}

/// Default worker pool size derived from hardware concurrency.
///
/// Uses every core when fewer than four are available; otherwise one core is
/// left free for foreground work.
pub fn default_worker_count() -> usize {
    let cores = thread::available_parallelism().map(usize::from).unwrap_or(1);
    if cores < 4 {
        cores
    } else {
        cores - 1
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Condvar, Mutex};
    use std::thread;
    use std::time::Duration;

    use super::{default_worker_count, Job, JobManager, Work};

    struct CountingWork {
        counter: Arc<AtomicUsize>,
    }

    impl Work for CountingWork {
        fn run(&self) {
            self.counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_independent_jobs_execute_exactly_once() {
        let manager = JobManager::new(4).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let jobs: Vec<_> = (0..100)
            .map(|_| {
                Job::new(CountingWork {
                    counter: Arc::clone(&counter),
                })
            })
            .collect();
        for job in &jobs {
            manager.enqueue(job, None);
        }
        for job in &jobs {
            job.join();
            assert!(job.is_done());
        }

        assert_eq!(counter.load(Ordering::SeqCst), 100);
        manager.finish();
    }

    /// Work that blocks until the shared gate opens, then counts.
    struct GatedWork {
        gate: Arc<(Mutex<bool>, Condvar)>,
        counter: Arc<AtomicUsize>,
    }

    impl Work for GatedWork {
        fn run(&self) {
            let (lock, condvar) = &*self.gate;
            let mut open = lock.lock().unwrap();
            while !*open {
                open = condvar.wait(open).unwrap();
            }
            drop(open);
            self.counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Work whose completion hook snapshots the shared counter.
    struct SnapshotWork {
        counter: Arc<AtomicUsize>,
        snapshot: Arc<AtomicUsize>,
    }

    impl Work for SnapshotWork {
        fn run(&self) {}

        fn on_done(&self) {
            self.snapshot
                .store(self.counter.load(Ordering::SeqCst), Ordering::SeqCst);
        }
    }

    #[test]
    fn test_parent_waits_for_subjobs() {
        let manager = JobManager::new(4).unwrap();
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        let counter = Arc::new(AtomicUsize::new(0));
        let snapshot = Arc::new(AtomicUsize::new(usize::MAX));

        let parent = Job::new(SnapshotWork {
            counter: Arc::clone(&counter),
            snapshot: Arc::clone(&snapshot),
        });

        let children: Vec<_> = (0..8)
            .map(|_| {
                Job::new(GatedWork {
                    gate: Arc::clone(&gate),
                    counter: Arc::clone(&counter),
                })
            })
            .collect();
        for child in &children {
            manager.enqueue(child, Some(&parent));
        }
        manager.enqueue(&parent, None);

        // the children are blocked on the gate, so the parent cannot be done
        assert!(!parent.is_done());

        {
            let (lock, condvar) = &*gate;
            *lock.lock().unwrap() = true;
            condvar.notify_all();
        }

        parent.join();
        assert!(parent.is_done());
        for child in &children {
            assert!(child.is_done());
        }
        // on_done observed every child's work
        assert_eq!(snapshot.load(Ordering::SeqCst), 8);
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_join_on_fresh_job_returns_immediately() {
        let counter = Arc::new(AtomicUsize::new(0));
        let job = Job::new(CountingWork { counter });
        assert!(job.is_done());
        job.join();
    }

    #[test]
    fn test_job_reuse() {
        let manager = JobManager::new(2).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let job = Job::new(CountingWork {
            counter: Arc::clone(&counter),
        });

        manager.enqueue(&job, None);
        job.join();
        manager.enqueue(&job, None);
        job.join();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    struct SleepingWork {
        counter: Arc<AtomicUsize>,
    }

    impl Work for SleepingWork {
        fn run(&self) {
            thread::sleep(Duration::from_millis(1));
            self.counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_finish_drains_queue() {
        let manager = JobManager::new(1).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let jobs: Vec<_> = (0..10)
            .map(|_| {
                Job::new(SleepingWork {
                    counter: Arc::clone(&counter),
                })
            })
            .collect();
        for job in &jobs {
            manager.enqueue(job, None);
        }
        manager.finish();

        assert_eq!(counter.load(Ordering::SeqCst), 10);
        for job in &jobs {
            assert!(job.is_done());
        }
    }

    #[test]
    fn test_default_worker_count() {
        let cores = thread::available_parallelism().map(usize::from).unwrap_or(1);
        let workers = default_worker_count();
        if cores < 4 {
            assert_eq!(workers, cores);
        } else {
            assert_eq!(workers, cores - 1);
        }
    }
}
