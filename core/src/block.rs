//! Dispatch blocks and completion notification
//!
//! A [`DispatchBlock`] wraps a unit of work that runs at most once. Notifications
//! attached with [`dispatch_block_notify`] are handed to their target queue by
//! whichever thread finishes the block, or straight away if it already finished.

use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::error::Result;
use crate::queue::{deliver, ExecutionQueue, ExecutionQueueExt, Job, QueueHandle};

/// How a block's body terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    Completed,
    Panicked,
}

struct BlockState {
    body: Option<Job>,
    outcome: Option<BlockOutcome>,
    notifications: Vec<(QueueHandle, Job)>,
}

struct BlockInner {
    state: Mutex<BlockState>,
    finished: Condvar,
}

/// Run-once unit of work with completion tracking. Clones share state.
#[derive(Clone)]
pub struct DispatchBlock {
    inner: Arc<BlockInner>,
}

impl DispatchBlock {
    pub fn new<F>(work: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            inner: Arc::new(BlockInner {
                state: Mutex::new(BlockState {
                    body: Some(Box::new(work)),
                    outcome: None,
                    notifications: Vec::new(),
                }),
                finished: Condvar::new(),
            }),
        }
    }

    /// Run the body on the calling thread.
    ///
    /// A panic in the body still completes the block and dispatches its
    /// notifications before resuming on this thread. Calls after the first are
    /// ignored.
    pub fn perform(&self) {
        let body = self.inner.state.lock().body.take();
        let Some(body) = body else {
            warn!("dispatch block already executed, ignoring");
            return;
        };

        let result = panic::catch_unwind(AssertUnwindSafe(body));
        let outcome = match result {
            Ok(()) => BlockOutcome::Completed,
            Err(_) => BlockOutcome::Panicked,
        };
        self.complete(outcome);

        if let Err(payload) = result {
            panic::resume_unwind(payload);
        }
    }

    /// Schedule the body on `queue`
    pub fn submit(&self, queue: &dyn ExecutionQueue) -> Result<()> {
        let block = self.clone();
        queue.dispatch(move || block.perform())
    }

    /// Run `notification` on `queue` once the body has finished.
    ///
    /// Registration never blocks. If a bounded `queue` is full when the body finishes,
    /// the notification is enqueued from a separate thread instead of the finishing one.
    pub fn notify<F>(&self, queue: QueueHandle, notification: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let job: Job = Box::new(notification);
        {
            let mut state = self.inner.state.lock();
            if state.outcome.is_none() {
                state.notifications.push((queue, job));
                return;
            }
        }
        deliver(queue, job);
    }

    pub fn outcome(&self) -> Option<BlockOutcome> {
        self.inner.state.lock().outcome
    }

    pub fn is_finished(&self) -> bool {
        self.outcome().is_some()
    }

    /// Block until the body finishes or `timeout` elapses
    pub fn wait(&self, timeout: Duration) -> Option<BlockOutcome> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while state.outcome.is_none() {
            if self.inner.finished.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.outcome
    }

    fn complete(&self, outcome: BlockOutcome) {
        let pending = {
            let mut state = self.inner.state.lock();
            state.outcome = Some(outcome);
            self.inner.finished.notify_all();
            mem::take(&mut state.notifications)
        };

        debug!(?outcome, notifications = pending.len(), "dispatch block finished");
        for (queue, job) in pending {
            deliver(queue, job);
        }
    }
}

impl std::fmt::Debug for DispatchBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("DispatchBlock")
            .field("outcome", &state.outcome)
            .field("pending_notifications", &state.notifications.len())
            .finish()
    }
}

/// Arrange for `notification` to run on `queue` strictly after `block` finishes, exactly once
pub fn dispatch_block_notify<F>(block: &DispatchBlock, queue: QueueHandle, notification: F)
where
    F: FnOnce() + Send + 'static,
{
    block.notify(queue, notification);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{ConcurrentQueue, ImmediateQueue, SerialQueue};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_notification_never_precedes_work() {
        let workers = ConcurrentQueue::new("work", 4).unwrap();
        let notify_queue: QueueHandle = Arc::new(SerialQueue::new("notify").unwrap());
        let (tx, rx) = crossbeam_channel::unbounded();

        for _ in 0..1_000 {
            let flag = Arc::new(AtomicBool::new(false));
            let set = flag.clone();
            let block = DispatchBlock::new(move || set.store(true, Ordering::SeqCst));

            let tx = tx.clone();
            dispatch_block_notify(&block, notify_queue.clone(), move || {
                tx.send(flag.load(Ordering::SeqCst)).unwrap();
            });
            block.submit(&workers).unwrap();
        }

        for _ in 0..1_000 {
            assert!(rx.recv_timeout(TIMEOUT).unwrap(), "notification ran before its block");
        }
    }

    #[test]
    fn test_notification_fires_exactly_once() {
        let queue = Arc::new(SerialQueue::new("once").unwrap());
        let handle: QueueHandle = queue.clone();
        let fired = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = crossbeam_channel::bounded(2);

        let block = DispatchBlock::new(|| {});
        let counter = fired.clone();
        dispatch_block_notify(&block, handle, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            tx.send(()).unwrap();
        });

        block.perform();
        block.perform();
        rx.recv_timeout(TIMEOUT).unwrap();

        // Flush the serial queue so a duplicate would have run by now
        let (flush_tx, flush_rx) = crossbeam_channel::bounded(1);
        queue.dispatch(move || flush_tx.send(()).unwrap()).unwrap();
        flush_rx.recv_timeout(TIMEOUT).unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_notify_after_completion_fires_immediately() {
        let block = DispatchBlock::new(|| {});
        block.perform();
        assert_eq!(block.outcome(), Some(BlockOutcome::Completed));

        let fired = Arc::new(AtomicBool::new(false));
        let f = fired.clone();
        let queue: QueueHandle = Arc::new(ImmediateQueue::default());
        dispatch_block_notify(&block, queue, move || f.store(true, Ordering::SeqCst));

        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_panicking_body_still_notifies() {
        let block = DispatchBlock::new(|| panic!("work failed"));
        let (tx, rx) = crossbeam_channel::bounded(1);
        let queue: QueueHandle = Arc::new(SerialQueue::new("after-panic").unwrap());
        dispatch_block_notify(&block, queue, move || tx.send(()).unwrap());

        let result = panic::catch_unwind(AssertUnwindSafe(|| block.perform()));
        assert!(result.is_err());
        assert_eq!(block.outcome(), Some(BlockOutcome::Panicked));
        rx.recv_timeout(TIMEOUT).unwrap();
    }

    #[test]
    fn test_each_notification_targets_its_queue() {
        let block = DispatchBlock::new(|| {});
        let (tx, rx) = crossbeam_channel::unbounded();

        for label in ["first", "second"] {
            let queue: QueueHandle = Arc::new(SerialQueue::new(label).unwrap());
            let tx = tx.clone();
            block.notify(queue, move || {
                tx.send(std::thread::current().name().map(str::to_string)).unwrap();
            });
        }
        block.perform();

        let mut names: Vec<_> = (0..2)
            .map(|_| rx.recv_timeout(TIMEOUT).unwrap().unwrap_or_default())
            .collect();
        names.sort();
        assert_eq!(names, vec!["first-0".to_string(), "second-0".to_string()]);
    }

    #[test]
    fn test_wait_times_out_on_pending_block() {
        let block = DispatchBlock::new(|| {});
        assert_eq!(block.wait(Duration::from_millis(20)), None);
        assert!(!block.is_finished());
    }

    #[test]
    fn test_wait_observes_queued_body() {
        let queue = SerialQueue::new("waiter").unwrap();
        let block = DispatchBlock::new(|| std::thread::sleep(Duration::from_millis(10)));
        block.submit(&queue).unwrap();

        assert_eq!(block.wait(TIMEOUT), Some(BlockOutcome::Completed));
    }

    #[test]
    fn test_notify_own_full_queue_from_its_worker() {
        // Capacity 1: the body occupies the only worker and a filler job fills the channel,
        // so the finishing worker cannot enqueue the notification itself
        let queue = Arc::new(SerialQueue::with_capacity("bounded", Some(1)).unwrap());
        let handle: QueueHandle = queue.clone();
        let (started_tx, started_rx) = crossbeam_channel::bounded(1);
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(1);
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);

        let block = DispatchBlock::new(move || {
            started_tx.send(()).unwrap();
            gate_rx.recv_timeout(TIMEOUT).unwrap();
        });
        block.submit(&*queue).unwrap();
        started_rx.recv_timeout(TIMEOUT).unwrap();

        queue.dispatch(|| {}).unwrap();
        dispatch_block_notify(&block, handle, move || done_tx.send(()).unwrap());
        gate_tx.send(()).unwrap();

        done_rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(block.outcome(), Some(BlockOutcome::Completed));
    }

    #[test]
    fn test_closed_notification_queue_is_tolerated() {
        let queue = Arc::new(SerialQueue::new("closed").unwrap());
        queue.shutdown();
        let handle: QueueHandle = queue;

        let block = DispatchBlock::new(|| {});
        dispatch_block_notify(&block, handle, || unreachable!("queue is closed"));
        block.perform();

        assert!(block.is_finished());
    }
}
