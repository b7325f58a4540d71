//! Dispatch overhead scenarios
//! Round trips are sampled one by one; the fan-out is timed as a single batch

use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Sender};
use tokio::runtime::Handle;
use tracing::{info, warn};

use super::latency::{dispatch_benchmark, run_bench_with_warmup, BenchResult};
use crate::block::{dispatch_block_notify, DispatchBlock};
use crate::config::{BenchConfig, QueueConfig};
use crate::error::{DispatchError, Result};
use crate::group::DispatchGroup;
use crate::queue::{ConcurrentQueue, ExecutionQueueExt, QueueHandle, SerialQueue, TokioQueue};

/// Longest a single round trip may take before the scenario is abandoned
const ROUND_TRIP_TIMEOUT: Duration = Duration::from_secs(10);

/// Submit `depth` nested jobs on `queue`; the innermost signals `done`
fn submit_chain(queue: &QueueHandle, depth: usize, done: Sender<()>) -> Result<()> {
    if depth <= 1 {
        return queue.dispatch(move || {
            done.send(()).ok();
        });
    }

    let next = queue.clone();
    queue.dispatch(move || {
        if let Err(e) = submit_chain(&next, depth - 1, done) {
            warn!("nested dispatch failed: {}", e);
        }
    })
}

fn timed_out(scenario: &str) -> DispatchError {
    DispatchError::Io(std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        format!("{} did not complete within {:?}", scenario, ROUND_TRIP_TIMEOUT),
    ))
}

/// Round trips through `queue`, each `depth` nested dispatches deep
pub fn async_hop(
    name: &str,
    queue: QueueHandle,
    depth: usize,
    warmup: u64,
    iterations: usize,
) -> Result<BenchResult> {
    let (tx, rx) = bounded::<()>(1);
    let mut failure: Option<DispatchError> = None;

    let result = run_bench_with_warmup(name, warmup, iterations as u64, || {
        if failure.is_some() {
            return;
        }
        if let Err(e) = submit_chain(&queue, depth, tx.clone()) {
            failure = Some(e);
            return;
        }
        if rx.recv_timeout(ROUND_TRIP_TIMEOUT).is_err() {
            failure = Some(timed_out(name));
        }
    });

    match failure {
        Some(e) => Err(e),
        None => Ok(result),
    }
}

/// Time to get into a job nested `depth` levels deep on a serial queue
pub fn serial_async_hop(depth: usize, warmup: u64, iterations: usize) -> Result<BenchResult> {
    let queue: QueueHandle = Arc::new(SerialQueue::new(format!("serial-hop-{}", depth))?);
    let name = match depth {
        1 => "serial async (1 hop)".to_string(),
        n => format!("serial async ({} nested hops)", n),
    };
    async_hop(&name, queue, depth, warmup, iterations)
}

/// Total time for `iterations` jobs on a concurrent queue, joined by a group notification
pub fn concurrent_fan_out(iterations: usize, queues: &QueueConfig) -> Result<BenchResult> {
    let queue: QueueHandle = Arc::new(ConcurrentQueue::with_config("fan-out", queues)?);
    let (tx, rx) = bounded::<()>(1);
    let mut failure: Option<DispatchError> = None;

    let total_ns = dispatch_benchmark(1, || {
        let group = DispatchGroup::new();
        for _ in 0..iterations {
            if let Err(e) = group.dispatch(&*queue, || {
                black_box(());
            }) {
                failure = Some(e);
                return;
            }
        }

        let done = tx.clone();
        group.notify(queue.clone(), move || {
            done.send(()).ok();
        });
        if rx.recv_timeout(ROUND_TRIP_TIMEOUT).is_err() {
            failure = Some(timed_out("concurrent fan-out"));
        }
    });

    match failure {
        Some(e) => Err(e),
        None => Ok(BenchResult::from_total(
            "concurrent fan-out (group notify)",
            iterations as u64,
            total_ns,
        )),
    }
}

/// Perform a block and wait for its notification on a serial queue
pub fn block_notify_round_trip(warmup: u64, iterations: usize) -> Result<BenchResult> {
    const NAME: &str = "block notify round trip";
    let queue: QueueHandle = Arc::new(SerialQueue::new("block-notify")?);
    let (tx, rx) = bounded::<()>(1);
    let mut failure: Option<DispatchError> = None;

    let result = run_bench_with_warmup(NAME, warmup, iterations as u64, || {
        if failure.is_some() {
            return;
        }
        let block = DispatchBlock::new(|| {
            black_box(());
        });
        let done = tx.clone();
        dispatch_block_notify(&block, queue.clone(), move || {
            done.send(()).ok();
        });
        block.perform();

        if rx.recv_timeout(ROUND_TRIP_TIMEOUT).is_err() {
            failure = Some(timed_out("block notify"));
        }
    });

    match failure {
        Some(e) => Err(e),
        None => Ok(result),
    }
}

/// Per-call cost of the harness itself
pub fn noop_baseline(config: &BenchConfig) -> BenchResult {
    run_bench_with_warmup("closure call (noop)", config.warmup_iterations, config.samples, || {
        black_box(());
    })
}

/// Run all benchmarks
pub fn run_all_benchmarks(
    config: &BenchConfig,
    queues: &QueueConfig,
    runtime: Option<Handle>,
) -> Result<Vec<BenchResult>> {
    let iterations = config.iterations;
    let warmup = config.warmup_iterations;
    info!(iterations, workers = queues.concurrent_workers, "running dispatch benchmarks");

    let mut results = vec![
        noop_baseline(config),
        serial_async_hop(1, warmup, iterations)?,
        serial_async_hop(2, warmup, iterations)?,
        serial_async_hop(3, warmup, iterations)?,
        concurrent_fan_out(iterations, queues)?,
        block_notify_round_trip(warmup, iterations)?,
    ];

    if let Some(handle) = runtime {
        let queue: QueueHandle = Arc::new(TokioQueue::new("tokio-blocking", handle));
        results.push(async_hop("tokio spawn_blocking (1 hop)", queue, 1, warmup, iterations)?);
    }

    Ok(results)
}

/// Print results as a boxed table
pub fn print_report(results: &[BenchResult]) {
    println!("\n╔══════════════════════════════════════════════════════════════════════════════╗");
    println!("║                       DISPATCH OVERHEAD BENCHMARKS                           ║");
    println!("╠══════════════════════════════════════════════════════════════════════════════╣");

    for r in results {
        println!("║ {} ║", r);
    }

    println!("╚══════════════════════════════════════════════════════════════════════════════╝");

    if let (Some(baseline), Some(hop)) = (
        results.iter().find(|r| r.name.starts_with("closure call")),
        results.iter().find(|r| r.name == "serial async (1 hop)"),
    ) {
        println!(
            "\n   Queue hop overhead over a direct call: {:.2}ns ({:.2}µs)",
            hop.avg_ns - baseline.avg_ns,
            (hop.avg_ns - baseline.avg_ns) / 1000.0
        );
    }
}
