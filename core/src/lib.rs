//! Dispatch Kit
//!
//! Measures the cost of invoking deferred work and attaches completion
//! notifications to it.
//!
//! ## Architecture
//! - Bench: `dispatch_benchmark` closure timing, latency harness, queue overhead scenarios
//! - Queue: `ExecutionQueue` trait with immediate, serial, concurrent and tokio-backed queues
//! - Block: run-once `DispatchBlock` and `dispatch_block_notify`
//! - Group: `DispatchGroup` fan-in notifications

pub mod bench;
pub mod block;
pub mod config;
pub mod error;
pub mod group;
pub mod logging;
pub mod queue;

pub use bench::{dispatch_benchmark, run_all_benchmarks, BenchResult};
pub use block::{dispatch_block_notify, BlockOutcome, DispatchBlock};
pub use config::Config;
pub use error::{DispatchError, Result};
pub use group::DispatchGroup;
pub use queue::{
    ConcurrentQueue, ExecutionQueue, ExecutionQueueExt, ImmediateQueue, Job, QueueHandle,
    QueueStats, SerialQueue, TokioQueue, TrySubmitError,
};
