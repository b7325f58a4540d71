//! Benchmark module
//! Closure timing and dispatch overhead scenarios

pub mod latency;
pub mod scenarios;

pub use latency::{
    average_ns,
    dispatch_benchmark,
    run_bench,
    run_bench_with_warmup,
    BenchResult,
};
pub use scenarios::{print_report, run_all_benchmarks};
