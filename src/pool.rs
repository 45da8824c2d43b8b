//! Fixed-size worker thread pool.
//!
//! The pool owns a bounded set of worker threads and an unbounded FIFO job
//! queue shared between the submitting thread and all workers. Jobs are
//! opaque closures; the pool never inspects their payload. Each job is
//! consumed by exactly one worker, in submission order relative to a single
//! submitter.
//!
//! [`ThreadPool::new`] blocks until every worker has signaled startup, so a
//! returned pool is immediately usable. [`ThreadPool::wait`] is a
//! synchronization barrier: it returns once the queue is empty *and* no
//! worker is mid-job. [`ThreadPool::shutdown`] flips the pool inactive,
//! discards still-queued jobs and wakes every worker so none is left
//! blocked; in-flight jobs run to completion. All blocking is
//! condition-variable driven; nothing in this module sleep-polls.

use std::{
    collections::VecDeque,
    fmt, io,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Condvar, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
};

use log::{debug, error, trace};
use thiserror::Error;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Errors raised while constructing a pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("thread pool requires at least one worker")]
    ZeroThreads,
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Error returned by [`ThreadPool::submit`] once the pool has shut down.
/// Carries the rejected job back to the caller for disposal.
#[derive(Error)]
#[error("thread pool is no longer accepting jobs")]
pub struct RejectedJob(pub Job);

impl fmt::Debug for RejectedJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RejectedJob").finish()
    }
}

struct JobQueue {
    jobs: VecDeque<Job>,
    active: bool,
}

struct Shared {
    queue: Mutex<JobQueue>,
    /// Wakes workers blocked on an empty queue.
    work_available: Condvar,
    /// Wakes callers blocked in `new`, `wait` or `shutdown`.
    state_changed: Condvar,
    alive: AtomicUsize,
    working: AtomicUsize,
}

pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<Worker>,
}

impl ThreadPool {
    /// Spawns `thread_count` workers and blocks until every one of them has
    /// published readiness.
    ///
    /// Fails on a zero count or if the OS refuses a thread; partially
    /// created workers are torn down before the error is returned.
    pub fn new(thread_count: u8) -> Result<Self, PoolError> {
        if thread_count == 0 {
            return Err(PoolError::ZeroThreads);
        }

        let shared = Arc::new(Shared {
            queue: Mutex::new(JobQueue {
                jobs: VecDeque::new(),
                active: true,
            }),
            work_available: Condvar::new(),
            state_changed: Condvar::new(),
            alive: AtomicUsize::new(0),
            working: AtomicUsize::new(0),
        });

        let mut workers = Vec::with_capacity(thread_count as usize);
        for id in 0..thread_count as usize {
            match Worker::spawn(id, Arc::clone(&shared)) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    let mut partial = Self { shared, workers };
                    partial.shutdown();
                    return Err(PoolError::Spawn(e));
                }
            }
        }

        let pool = Self { shared, workers };
        let mut queue = pool.shared.queue.lock().unwrap();
        while pool.shared.alive.load(Ordering::SeqCst) < thread_count as usize {
            queue = pool.shared.state_changed.wait(queue).unwrap();
        }
        drop(queue);

        debug!("thread pool ready with {thread_count} workers");
        Ok(pool)
    }

    /// Appends a job to the queue tail and wakes a blocked worker.
    ///
    /// Never blocks on capacity; the queue is unbounded. Fails only once
    /// [`shutdown`](Self::shutdown) has run, handing the job back.
    pub fn submit<F>(&self, job: F) -> Result<(), RejectedJob>
    where
        F: FnOnce() + Send + 'static,
    {
        let job: Job = Box::new(job);
        let mut queue = self.shared.queue.lock().unwrap();
        if !queue.active {
            return Err(RejectedJob(job));
        }
        queue.jobs.push_back(job);
        self.shared.work_available.notify_one();
        Ok(())
    }

    /// Blocks until the queue is empty and no worker is executing a job.
    ///
    /// Every `submit` that returned before this call is fully complete once
    /// `wait` returns.
    pub fn wait(&self) {
        let mut queue = self.shared.queue.lock().unwrap();
        while !queue.jobs.is_empty() || self.shared.working.load(Ordering::SeqCst) != 0 {
            queue = self.shared.state_changed.wait(queue).unwrap();
        }
    }

    /// Flips the pool inactive, discards still-queued jobs and waits for
    /// every worker to exit before joining it.
    ///
    /// Jobs already in flight run to completion; discarded jobs release
    /// their payloads through their destructors. Idempotent; also invoked
    /// on drop.
    pub fn shutdown(&mut self) {
        let mut queue = self.shared.queue.lock().unwrap();
        queue.active = false;
        let discarded = queue.jobs.len();
        queue.jobs.clear();
        if discarded > 0 {
            debug!("discarding {discarded} queued jobs at shutdown");
        }
        self.shared.work_available.notify_all();
        self.shared.state_changed.notify_all();

        while self.shared.alive.load(Ordering::SeqCst) != 0 {
            queue = self.shared.state_changed.wait(queue).unwrap();
        }
        drop(queue);

        for worker in self.workers.drain(..) {
            trace!("joining worker {}", worker.id);
            if worker.thread.join().is_err() {
                error!("worker {} terminated abnormally", worker.id);
            }
        }
    }

    /// Number of workers that have started up and not yet exited.
    pub fn alive(&self) -> usize {
        self.shared.alive.load(Ordering::SeqCst)
    }

    /// Number of workers currently executing a job body.
    pub fn working(&self) -> usize {
        self.shared.working.load(Ordering::SeqCst)
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker {
    id: usize,
    thread: thread::JoinHandle<()>,
}

impl Worker {
    fn spawn(id: usize, shared: Arc<Shared>) -> io::Result<Self> {
        let thread = thread::Builder::new()
            .name(format!("netcalc-worker-{id}"))
            .spawn(move || Self::run(id, shared))?;

        Ok(Self { id, thread })
    }

    fn run(id: usize, shared: Arc<Shared>) {
        {
            let _queue = shared.queue.lock().unwrap();
            shared.alive.fetch_add(1, Ordering::SeqCst);
            shared.state_changed.notify_all();
        }
        debug!("worker {id} ready");

        loop {
            let job = {
                let mut queue = shared.queue.lock().unwrap();
                loop {
                    if !queue.active {
                        break None;
                    }
                    if let Some(job) = queue.jobs.pop_front() {
                        // Marked busy before the lock drops so `wait` never
                        // observes an empty queue while a job is in hand.
                        shared.working.fetch_add(1, Ordering::SeqCst);
                        break Some(job);
                    }
                    queue = shared.work_available.wait(queue).unwrap();
                }
            };

            let Some(job) = job else { break };

            trace!("worker {id} picked up a job");
            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                error!("worker {id}: job panicked");
            }

            let _queue = shared.queue.lock().unwrap();
            shared.working.fetch_sub(1, Ordering::SeqCst);
            shared.state_changed.notify_all();
        }

        let _queue = shared.queue.lock().unwrap();
        shared.alive.fetch_sub(1, Ordering::SeqCst);
        shared.state_changed.notify_all();
        debug!("worker {id} exiting");
    }
}
