//! Queue adapter over a tokio runtime's blocking pool

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;

use super::{run_job, ExecutionQueue, Job, QueueStats};
use crate::error::{DispatchError, Result};

/// Submits jobs with `spawn_blocking`; ordering is whatever the runtime provides
pub struct TokioQueue {
    label: String,
    handle: Handle,
    closed: AtomicBool,
    stats: Arc<QueueStats>,
}

impl TokioQueue {
    pub fn new(label: impl Into<String>, handle: Handle) -> Self {
        let label = label.into();
        Self {
            stats: Arc::new(QueueStats::new(&label)),
            label,
            handle,
            closed: AtomicBool::new(false),
        }
    }

    /// Bind to the runtime the caller is running on
    pub fn current(label: impl Into<String>) -> Result<Self> {
        let handle = Handle::try_current().map_err(|e| DispatchError::Runtime(e.to_string()))?;
        Ok(Self::new(label, handle))
    }
}

impl ExecutionQueue for TokioQueue {
    fn label(&self) -> &str {
        &self.label
    }

    fn submit(&self, job: Job) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DispatchError::queue_closed(&self.label));
        }
        self.stats.record_submitted();

        let label = self.label.clone();
        let stats = self.stats.clone();
        self.handle.spawn_blocking(move || run_job(&label, job, &stats));
        Ok(())
    }

    fn stats(&self) -> &QueueStats {
        &self.stats
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
