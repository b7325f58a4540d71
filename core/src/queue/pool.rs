//! Thread-backed queues
//! Workers drain a shared crossbeam channel until every sender is gone

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{run_job, ExecutionQueue, Job, QueueStats, TrySubmitError};
use crate::config::QueueConfig;
use crate::error::{DispatchError, Result};

struct WorkerPool {
    label: String,
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stats: Arc<QueueStats>,
}

impl WorkerPool {
    fn start(label: String, num_workers: usize, capacity: Option<usize>) -> Result<Self> {
        let (tx, rx) = match capacity {
            Some(cap) => bounded::<Job>(cap),
            None => unbounded::<Job>(),
        };

        let pool = Self {
            stats: Arc::new(QueueStats::new(&label)),
            label,
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(Vec::with_capacity(num_workers)),
        };

        // On spawn failure `pool` drops here, which closes the channel and joins what started
        for worker_id in 0..num_workers {
            let handle = pool.spawn_worker(worker_id, rx.clone())?;
            pool.workers.lock().push(handle);
        }

        info!(queue = %pool.label, workers = num_workers, "queue started");
        Ok(pool)
    }

    fn spawn_worker(&self, worker_id: usize, rx: Receiver<Job>) -> Result<JoinHandle<()>> {
        let label = self.label.clone();
        let stats = self.stats.clone();

        thread::Builder::new()
            .name(format!("{}-{}", self.label, worker_id))
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    run_job(&label, job, &stats);
                }
                debug!(queue = %label, worker_id, "worker exiting");
            })
            .map_err(|source| DispatchError::Spawn {
                label: self.label.clone(),
                source,
            })
    }

    fn submit(&self, job: Job) -> Result<()> {
        // Clone out so a full bounded channel never blocks `shutdown`
        let sender = self
            .sender
            .lock()
            .clone()
            .ok_or_else(|| DispatchError::queue_closed(&self.label))?;

        sender
            .send(job)
            .map_err(|_| DispatchError::queue_closed(&self.label))?;
        self.stats.record_submitted();
        Ok(())
    }

    fn try_submit(&self, job: Job) -> std::result::Result<(), TrySubmitError> {
        let sender = match self.sender.lock().clone() {
            Some(sender) => sender,
            None => return Err(TrySubmitError::Closed(DispatchError::queue_closed(&self.label))),
        };

        match sender.try_send(job) {
            Ok(()) => {
                self.stats.record_submitted();
                Ok(())
            }
            Err(TrySendError::Full(job)) => Err(TrySubmitError::Full(job)),
            Err(TrySendError::Disconnected(_)) => {
                Err(TrySubmitError::Closed(DispatchError::queue_closed(&self.label)))
            }
        }
    }

    fn shutdown(&self) {
        if self.sender.lock().take().is_some() {
            info!(queue = %self.label, "queue shutting down");
        }
    }

    fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();

        let current = thread::current().id();
        for handle in self.workers.get_mut().drain(..) {
            // The last handle may be released by a job running on this very pool
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!(queue = %self.label, "worker terminated abnormally");
            }
        }
    }
}

/// One worker, strict FIFO, one job at a time
pub struct SerialQueue {
    pool: WorkerPool,
}

impl SerialQueue {
    pub fn new(label: impl Into<String>) -> Result<Self> {
        Self::with_capacity(label, None)
    }

    pub fn with_capacity(label: impl Into<String>, capacity: Option<usize>) -> Result<Self> {
        Ok(Self {
            pool: WorkerPool::start(label.into(), 1, capacity)?,
        })
    }
}

impl ExecutionQueue for SerialQueue {
    fn label(&self) -> &str {
        &self.pool.label
    }

    fn submit(&self, job: Job) -> Result<()> {
        self.pool.submit(job)
    }

    fn try_submit(&self, job: Job) -> std::result::Result<(), TrySubmitError> {
        self.pool.try_submit(job)
    }

    fn stats(&self) -> &QueueStats {
        &self.pool.stats
    }

    fn shutdown(&self) {
        self.pool.shutdown();
    }
}

/// Several workers pulling from one channel; jobs may run in parallel
pub struct ConcurrentQueue {
    pool: WorkerPool,
}

impl ConcurrentQueue {
    pub fn new(label: impl Into<String>, num_workers: usize) -> Result<Self> {
        if num_workers == 0 {
            return Err(DispatchError::Config(
                "concurrent queue needs at least one worker".to_string(),
            ));
        }
        Ok(Self {
            pool: WorkerPool::start(label.into(), num_workers, None)?,
        })
    }

    pub fn with_config(label: impl Into<String>, config: &QueueConfig) -> Result<Self> {
        if config.concurrent_workers == 0 {
            return Err(DispatchError::Config(
                "concurrent queue needs at least one worker".to_string(),
            ));
        }
        Ok(Self {
            pool: WorkerPool::start(label.into(), config.concurrent_workers, config.channel_capacity)?,
        })
    }

    pub fn num_workers(&self) -> usize {
        self.pool.worker_count()
    }
}

impl ExecutionQueue for ConcurrentQueue {
    fn label(&self) -> &str {
        &self.pool.label
    }

    fn submit(&self, job: Job) -> Result<()> {
        self.pool.submit(job)
    }

    fn try_submit(&self, job: Job) -> std::result::Result<(), TrySubmitError> {
        self.pool.try_submit(job)
    }

    fn stats(&self) -> &QueueStats {
        &self.pool.stats
    }

    fn shutdown(&self) {
        self.pool.shutdown();
    }
}
