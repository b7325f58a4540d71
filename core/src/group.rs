//! Fan-in over several units of work

use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::Result;
use crate::queue::{deliver, ExecutionQueue, ExecutionQueueExt, Job, QueueHandle};

#[derive(Default)]
struct GroupState {
    outstanding: usize,
    notifications: Vec<(QueueHandle, Job)>,
}

#[derive(Default)]
struct GroupInner {
    state: Mutex<GroupState>,
    drained: Condvar,
}

/// Counts outstanding work; notifications fire each time the count drains to zero
#[derive(Clone, Default)]
pub struct DispatchGroup {
    inner: Arc<GroupInner>,
}

impl DispatchGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) {
        self.inner.state.lock().outstanding += 1;
    }

    /// # Panics
    ///
    /// Panics when called more times than [`enter`](Self::enter).
    pub fn leave(&self) {
        let pending = {
            let mut state = self.inner.state.lock();
            assert!(state.outstanding > 0, "unbalanced DispatchGroup::leave");
            state.outstanding -= 1;
            if state.outstanding > 0 {
                return;
            }
            self.inner.drained.notify_all();
            mem::take(&mut state.notifications)
        };

        for (queue, job) in pending {
            deliver(queue, job);
        }
    }

    /// Run `f` on `queue` as a member of the group. The group is left even if `f` panics
    /// or the queue rejects the job.
    pub fn dispatch<F>(&self, queue: &dyn ExecutionQueue, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.enter();
        let guard = LeaveGuard(self.clone());
        queue.dispatch(move || {
            let _guard = guard;
            f();
        })
    }

    pub fn notify<F>(&self, queue: QueueHandle, notification: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let job: Job = Box::new(notification);
        {
            let mut state = self.inner.state.lock();
            if state.outstanding > 0 {
                state.notifications.push((queue, job));
                return;
            }
        }
        deliver(queue, job);
    }

    /// Returns `false` if work is still outstanding after `timeout`
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while state.outstanding > 0 {
            if self.inner.drained.wait_until(&mut state, deadline).timed_out() {
                return state.outstanding == 0;
            }
        }
        true
    }

    pub fn outstanding(&self) -> usize {
        self.inner.state.lock().outstanding
    }
}

// Dropped with the job, whether it ran, unwound or was never accepted
struct LeaveGuard(DispatchGroup);

impl Drop for LeaveGuard {
    fn drop(&mut self) {
        self.0.leave();
    }
}
