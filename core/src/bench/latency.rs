//! Closure timing
//! `dispatch_benchmark` for total wall time, `run_bench` for per-call distribution

use std::hint::black_box;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Warmup calls made by `run_bench` before sampling
pub const DEFAULT_WARMUP: u64 = 1_000;

/// Invoke `work` `count` times on the calling thread and return the total elapsed nanoseconds.
///
/// The clock covers only the invocations. A count of zero returns `0` without calling `work`.
/// Panics from `work` are not caught.
pub fn dispatch_benchmark<F>(count: usize, mut work: F) -> u64
where
    F: FnMut(),
{
    if count == 0 {
        return 0;
    }

    let start = Instant::now();
    for _ in 0..count {
        black_box(work());
    }
    duration_ns(start.elapsed())
}

/// Mean nanoseconds per call, `0.0` when nothing ran
pub fn average_ns(total_ns: u64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total_ns as f64 / count as f64
    }
}

#[inline]
fn duration_ns(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
}

/// Benchmark result
///
/// Distribution fields are `None` when the run was timed as one block.
#[derive(Debug, Clone, Serialize)]
pub struct BenchResult {
    pub name: String,
    pub iterations: u64,
    pub total_ns: u64,
    pub avg_ns: f64,
    pub min_ns: Option<u64>,
    pub max_ns: Option<u64>,
    pub p50_ns: Option<u64>,
    pub p99_ns: Option<u64>,
    pub throughput_ops: f64,
}

impl BenchResult {
    /// Result for a scenario that was timed as one block, without per-call samples
    pub fn from_total(name: &str, iterations: u64, total_ns: u64) -> Self {
        let avg = average_ns(total_ns, iterations as usize);
        Self {
            name: name.to_string(),
            iterations,
            total_ns,
            avg_ns: avg,
            min_ns: None,
            max_ns: None,
            p50_ns: None,
            p99_ns: None,
            throughput_ops: throughput(avg),
        }
    }
}

impl std::fmt::Display for BenchResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:<34} | avg: {:>10.2}ns | min: {:>8}ns | p50: {:>8}ns | p99: {:>8}ns | throughput: {:>12.0} ops/s",
            self.name,
            self.avg_ns,
            show_ns(self.min_ns),
            show_ns(self.p50_ns),
            show_ns(self.p99_ns),
            self.throughput_ops
        )
    }
}

fn show_ns(value: Option<u64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn throughput(avg_ns: f64) -> f64 {
    if avg_ns > 0.0 {
        1_000_000_000.0 / avg_ns
    } else {
        0.0
    }
}

/// Run a benchmark with high precision
pub fn run_bench<F>(name: &str, iterations: u64, f: F) -> BenchResult
where
    F: FnMut(),
{
    run_bench_with_warmup(name, DEFAULT_WARMUP, iterations, f)
}

pub fn run_bench_with_warmup<F>(name: &str, warmup: u64, iterations: u64, mut f: F) -> BenchResult
where
    F: FnMut(),
{
    for _ in 0..warmup {
        black_box(f());
    }

    let mut samples = Vec::with_capacity(iterations as usize);
    for _ in 0..iterations {
        let start = Instant::now();
        black_box(f());
        samples.push(duration_ns(start.elapsed()));
    }

    samples.sort_unstable();

    let total: u64 = samples.iter().fold(0u64, |acc, s| acc.saturating_add(*s));
    let avg = average_ns(total, samples.len());
    let min = samples.first().copied();
    let max = samples.last().copied();
    let p50 = samples.get(samples.len() / 2).copied();
    let p99 = samples.get(samples.len() * 99 / 100).copied();

    BenchResult {
        name: name.to_string(),
        iterations,
        total_ns: total,
        avg_ns: avg,
        min_ns: min,
        max_ns: max,
        p50_ns: p50,
        p99_ns: p99,
        throughput_ops: throughput(avg),
    }
}
