//! Benchmarks for the relay hot path
//!
//! Measures:
//! - Full poll over a realistic charging stream (framing, rewriting, forwarding)
//! - Resynchronization over pure line noise
//! - Raw checksum and frame validation cost
//!
//! Platform: Cross-platform, synthetic data only

use bms_relay::BmsRelay;
use bms_relay::test_utils::{ManualClock, sample_traffic};
use bms_relay::types::{Frame, checksum};
use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use std::collections::VecDeque;
use std::hint::black_box;

fn bench_poll_charging_stream(c: &mut Criterion) {
    let traffic = sample_traffic(60);

    let mut group = c.benchmark_group("relay_poll");
    group.throughput(Throughput::Bytes(traffic.len() as u64));

    group.bench_function("charging_minute", |b| {
        b.iter_batched(
            || {
                let queue = VecDeque::from(traffic.clone());
                BmsRelay::new(queue, Vec::<u8>::with_capacity(traffic.len()), ManualClock::new(0))
            },
            |mut relay| {
                relay.poll();
                black_box(relay.sink().len())
            },
            BatchSize::SmallInput,
        )
    });

    let noise: Vec<u8> = (0..traffic.len()).map(|i| (i % 0xFF) as u8).collect();
    group.bench_function("line_noise", |b| {
        b.iter_batched(
            || BmsRelay::new(VecDeque::from(noise.clone()), Vec::<u8>::new(), ManualClock::new(0)),
            |mut relay| black_box(relay.poll()),
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

fn bench_frame_validation(c: &mut Criterion) {
    let traffic = sample_traffic(1);
    // Cell voltage frame: the longest one on the line.
    let mut cells = traffic[7..45].to_vec();

    let mut group = c.benchmark_group("frame_validation");
    group.throughput(Throughput::Bytes(cells.len() as u64));

    group.bench_function("checksum_38_bytes", |b| b.iter(|| black_box(checksum(black_box(&cells)))));

    group.bench_function("frame_new_and_recalculate", |b| {
        b.iter(|| {
            let mut frame = Frame::new(black_box(&mut cells));
            frame.recalculate_checksum();
            black_box(frame.is_valid())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_poll_charging_stream, bench_frame_validation);
criterion_main!(benches);
