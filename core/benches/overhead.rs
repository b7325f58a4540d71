//! Criterion benches for closure and queue dispatch overhead

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use crossbeam_channel::bounded;
use dispatch_kit::{
    dispatch_benchmark, dispatch_block_notify, DispatchBlock, ExecutionQueueExt, ImmediateQueue,
    QueueHandle, SerialQueue,
};

fn bench_dispatch_benchmark(c: &mut Criterion) {
    c.bench_function("dispatch_benchmark/1000 noops", |b| {
        b.iter(|| {
            dispatch_benchmark(1_000, || {
                black_box(());
            })
        })
    });
}

fn bench_serial_hop(c: &mut Criterion) {
    let queue = SerialQueue::new("criterion-serial").expect("serial queue");
    let (tx, rx) = bounded::<()>(1);

    c.bench_function("serial queue round trip", |b| {
        b.iter(|| {
            let tx = tx.clone();
            queue
                .dispatch(move || {
                    tx.send(()).ok();
                })
                .expect("queue open");
            rx.recv().expect("round trip");
        })
    });
}

fn bench_block_notify(c: &mut Criterion) {
    let queue: QueueHandle = Arc::new(ImmediateQueue::new("criterion-immediate"));

    c.bench_function("block notify (immediate queue)", |b| {
        b.iter(|| {
            let block = DispatchBlock::new(|| {
                black_box(());
            });
            dispatch_block_notify(&block, queue.clone(), || {
                black_box(());
            });
            block.perform();
        })
    });
}

criterion_group!(benches, bench_dispatch_benchmark, bench_serial_hop, bench_block_notify);
criterion_main!(benches);
