//! Execution queues
//! Targets that accept jobs and run them under their own ordering discipline

mod immediate;
mod pool;
mod runtime;

pub use immediate::ImmediateQueue;
pub use pool::{ConcurrentQueue, SerialQueue};
pub use runtime::TokioQueue;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use metrics::{counter, Counter};
use tracing::{debug, error};

use crate::error::{DispatchError, Result};

/// A boxed unit of work
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Shared reference to a queue
pub type QueueHandle = Arc<dyn ExecutionQueue>;

/// A scheduling target for jobs
pub trait ExecutionQueue: Send + Sync {
    fn label(&self) -> &str;

    /// Hand a job to the queue. Returns `QueueClosed` once the queue has shut down.
    fn submit(&self, job: Job) -> Result<()>;

    fn stats(&self) -> &QueueStats;

    /// Hand a job over only if the queue can take it without blocking.
    ///
    /// Queues that never block in `submit` keep the default.
    fn try_submit(&self, job: Job) -> std::result::Result<(), TrySubmitError> {
        self.submit(job).map_err(TrySubmitError::Closed)
    }

    /// Stop accepting jobs. Jobs already accepted still run.
    fn shutdown(&self) {}
}

/// Why `try_submit` did not accept a job
pub enum TrySubmitError {
    /// The queue is at capacity; the job is handed back
    Full(Job),
    Closed(DispatchError),
}

/// Closure submission for any queue, including `dyn ExecutionQueue`
pub trait ExecutionQueueExt: ExecutionQueue {
    fn dispatch<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Box::new(f))
    }
}

impl<Q: ExecutionQueue + ?Sized> ExecutionQueueExt for Q {}

/// Per-queue counters, mirrored into `metrics`
pub struct QueueStats {
    pub jobs_submitted: AtomicU64,
    pub jobs_executed: AtomicU64,
    pub jobs_panicked: AtomicU64,
    submitted_counter: Counter,
    executed_counter: Counter,
    panicked_counter: Counter,
}

impl QueueStats {
    pub fn new(label: &str) -> Self {
        let label = label.to_string();
        Self {
            jobs_submitted: AtomicU64::new(0),
            jobs_executed: AtomicU64::new(0),
            jobs_panicked: AtomicU64::new(0),
            submitted_counter: counter!("dispatch_jobs_submitted_total", "queue" => label.clone()),
            executed_counter: counter!("dispatch_jobs_executed_total", "queue" => label.clone()),
            panicked_counter: counter!("dispatch_jobs_panicked_total", "queue" => label),
        }
    }

    pub fn submitted(&self) -> u64 {
        self.jobs_submitted.load(Ordering::Relaxed)
    }

    pub fn executed(&self) -> u64 {
        self.jobs_executed.load(Ordering::Relaxed)
    }

    pub fn panicked(&self) -> u64 {
        self.jobs_panicked.load(Ordering::Relaxed)
    }

    pub(crate) fn record_submitted(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
        self.submitted_counter.increment(1);
    }

    fn record_executed(&self) {
        self.jobs_executed.fetch_add(1, Ordering::Relaxed);
        self.executed_counter.increment(1);
    }

    fn record_panicked(&self) {
        self.jobs_panicked.fetch_add(1, Ordering::Relaxed);
        self.panicked_counter.increment(1);
    }
}

/// Run a job, isolating the caller from its panic
pub(crate) fn run_job(label: &str, job: Job, stats: &QueueStats) {
    match panic::catch_unwind(AssertUnwindSafe(job)) {
        Ok(()) => {
            stats.record_executed();
            debug!(queue = label, "job finished");
        }
        Err(payload) => {
            stats.record_panicked();
            error!(queue = label, "job panicked: {}", panic_message(payload.as_ref()));
        }
    }
}

/// Hand a completion notification to its queue without blocking the caller.
///
/// A full bounded queue gets the job from a short-lived overflow thread, so a block
/// finishing on that same queue cannot wait on itself. A closed queue drops the job
/// with an error log.
pub(crate) fn deliver(queue: QueueHandle, job: Job) {
    counter!("dispatch_notifications_total", "queue" => queue.label().to_string()).increment(1);
    match queue.try_submit(job) {
        Ok(()) => {}
        Err(TrySubmitError::Closed(e)) => {
            error!(queue = queue.label(), "dropping notification: {}", e);
        }
        Err(TrySubmitError::Full(job)) => {
            debug!(queue = queue.label(), "queue full, handing notification to overflow thread");
            let name = format!("{}-overflow", queue.label());
            let target = queue.clone();
            let spawned = thread::Builder::new().name(name).spawn(move || {
                if let Err(e) = target.submit(job) {
                    error!(queue = target.label(), "dropping notification: {}", e);
                }
            });
            if let Err(e) = spawned {
                error!(queue = queue.label(), "dropping notification, overflow spawn failed: {}", e);
            }
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_job_counts_panics() {
        let stats = QueueStats::new("test");
        run_job("test", Box::new(|| {}), &stats);
        run_job("test", Box::new(|| panic!("boom")), &stats);

        assert_eq!(stats.executed(), 1);
        assert_eq!(stats.panicked(), 1);
    }

    #[test]
    fn test_dispatch_through_handle() {
        let queue: QueueHandle = Arc::new(ImmediateQueue::new("handle"));
        let hits = Arc::new(AtomicU64::new(0));
        let h = hits.clone();

        queue
            .dispatch(move || {
                h.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        let as_dyn: &dyn ExecutionQueue = queue.as_ref();
        let h = hits.clone();
        as_dyn
            .dispatch(move || {
                h.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(queue.stats().executed(), 2);
    }

    #[test]
    fn test_deliver_to_closed_queue_drops_job() {
        let queue: QueueHandle = Arc::new(ImmediateQueue::new("closed-deliver"));
        queue.shutdown();
        deliver(queue.clone(), Box::new(|| unreachable!("queue is closed")));
        assert_eq!(queue.stats().submitted(), 0);
    }

    #[test]
    fn test_panic_message() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let borrowed: Box<dyn Any + Send> = Box::new("static");
        let other: Box<dyn Any + Send> = Box::new(7u8);

        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(borrowed.as_ref()), "static");
        assert_eq!(panic_message(other.as_ref()), "<non-string panic payload>");
    }
}
