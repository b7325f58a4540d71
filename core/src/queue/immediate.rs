use std::sync::atomic::{AtomicBool, Ordering};

use super::{run_job, ExecutionQueue, Job, QueueStats};
use crate::error::{DispatchError, Result};

/// Runs every job synchronously inside `submit`
pub struct ImmediateQueue {
    label: String,
    closed: AtomicBool,
    stats: QueueStats,
}

impl ImmediateQueue {
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            stats: QueueStats::new(&label),
            label,
            closed: AtomicBool::new(false),
        }
    }
}

impl Default for ImmediateQueue {
    fn default() -> Self {
        Self::new("immediate")
    }
}

impl ExecutionQueue for ImmediateQueue {
    fn label(&self) -> &str {
        &self.label
    }

    fn submit(&self, job: Job) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DispatchError::queue_closed(&self.label));
        }
        self.stats.record_submitted();
        run_job(&self.label, job, &self.stats);
        Ok(())
    }

    fn stats(&self) -> &QueueStats {
        &self.stats
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::ExecutionQueueExt;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_runs_inline() {
        let queue = ImmediateQueue::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();

        queue.dispatch(move || {
            h.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        // No waiting needed: the job ran before dispatch returned
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(queue.stats().executed(), 1);
    }

    #[test]
    fn test_closed_rejects() {
        let queue = ImmediateQueue::new("inline");
        queue.shutdown();
        let err = queue.dispatch(|| {}).unwrap_err();
        assert!(matches!(err, DispatchError::QueueClosed { .. }));
    }
}
