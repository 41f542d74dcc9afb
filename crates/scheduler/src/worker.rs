//! Bounded worker pool for page jobs.
//!
//! A fixed number of named worker threads pull page numbers from a bounded
//! job channel, run the executor, and push `(page, result)` pairs back on a
//! result channel. Since every worker handles one job at a time, no more
//! than `num_workers` jobs are ever in flight.

use crate::SchedulerError;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Configuration for a worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads to spawn.
    /// Default: number of logical CPU cores.
    pub num_workers: usize,

    /// Thread name prefix; workers are named `<prefix>-<id>`.
    pub thread_name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::new(num_cpus())
    }
}

impl WorkerPoolConfig {
    /// Create a configuration with `num_workers` threads (at least one).
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers: num_workers.max(1),
            thread_name: "pageview-worker".to_owned(),
        }
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

/// Pool of worker threads executing one job per page.
pub struct WorkerPool<R> {
    jobs: Option<SyncSender<u32>>,
    results: Receiver<(u32, Option<R>)>,
    workers: Vec<JoinHandle<()>>,
}

impl<R: Send + 'static> WorkerPool<R> {
    /// Spawns the workers. `executor` runs on the worker threads.
    pub fn new<F>(config: WorkerPoolConfig, executor: F) -> Result<Self, SchedulerError>
    where
        F: Fn(u32) -> R + Send + Sync + 'static,
    {
        let (job_tx, job_rx) = mpsc::sync_channel::<u32>(config.num_workers);
        let (result_tx, result_rx) = mpsc::channel();
        let job_rx = Arc::new(Mutex::new(job_rx));
        let executor = Arc::new(executor);

        let mut workers = Vec::with_capacity(config.num_workers);
        for id in 0..config.num_workers {
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            let executor = Arc::clone(&executor);

            let handle = thread::Builder::new()
                .name(format!("{}-{}", config.thread_name, id))
                .spawn(move || {
                    loop {
                        // Hold the lock only while waiting for the next job.
                        let job = job_rx.lock().unwrap().recv();
                        let Ok(page) = job else {
                            break;
                        };
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| executor(page))).ok();
                        if result_tx.send((page, outcome)).is_err() {
                            break;
                        }
                    }
                })
                .map_err(SchedulerError::Spawn)?;
            workers.push(handle);
        }

        Ok(Self {
            jobs: Some(job_tx),
            results: result_rx,
            workers,
        })
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Queues a page; blocks while the job channel is full.
    pub fn submit(&self, page: u32) -> Result<(), SchedulerError> {
        let jobs = self.jobs.as_ref().ok_or(SchedulerError::Disconnected)?;
        jobs.send(page).map_err(|_| SchedulerError::Disconnected)
    }

    /// Waits for the next finished job.
    pub fn recv(&self) -> Result<(u32, R), SchedulerError> {
        match self.recv_outcome()? {
            (page, Some(result)) => Ok((page, result)),
            (page, None) => Err(SchedulerError::WorkerPanicked { page }),
        }
    }

    /// Waits for the next finished job; `None` if the executor panicked.
    fn recv_outcome(&self) -> Result<(u32, Option<R>), SchedulerError> {
        self.results.recv().map_err(|_| SchedulerError::Disconnected)
    }

    /// Closes the job channel and waits for every worker to exit.
    pub fn shutdown(mut self) -> Result<(), SchedulerError> {
        self.jobs.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                return Err(SchedulerError::Disconnected);
            }
        }
        Ok(())
    }
}

impl<R> Drop for WorkerPool<R> {
    fn drop(&mut self) {
        self.jobs.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// Runs `executor` over pages `1..=page_count` in consecutive batches of
/// `config.num_workers`, waiting for each batch to finish before the next.
///
/// `should_stop` is checked before every batch; `on_batch` receives the
/// last page of the batch and its results in completion order and returns
/// `false` to stop. A page whose executor panicked arrives as `None` and
/// the batch carries on. Returns `true` if every batch ran.
pub fn run_in_batches<R, F, S, C>(
    config: WorkerPoolConfig,
    page_count: u32,
    executor: F,
    mut should_stop: S,
    mut on_batch: C,
) -> Result<bool, SchedulerError>
where
    R: Send + 'static,
    F: Fn(u32) -> R + Send + Sync + 'static,
    S: FnMut() -> bool,
    C: FnMut(u32, Vec<(u32, Option<R>)>) -> bool,
{
    if page_count == 0 {
        return Ok(true);
    }

    let batch_size = config.num_workers.max(1) as u32;
    let pool = WorkerPool::new(config, executor)?;
    let mut completed = true;

    let mut first = 1;
    while first <= page_count {
        if should_stop() {
            completed = false;
            break;
        }

        let last = first.saturating_add(batch_size - 1).min(page_count);
        tracing::debug!(first, last, "dispatching batch");

        for page in first..=last {
            pool.submit(page)?;
        }

        let mut results = Vec::with_capacity((last - first + 1) as usize);
        for _ in first..=last {
            let (page, outcome) = pool.recv_outcome()?;
            if outcome.is_none() {
                tracing::warn!(page, "worker panicked; page counted as failed");
            }
            results.push((page, outcome));
        }

        if !on_batch(last, results) {
            completed = false;
            break;
        }

        first = last + 1;
    }

    pool.shutdown()?;
    Ok(completed)
}

/// Get the number of logical CPU cores.
pub(crate) fn num_cpus() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
