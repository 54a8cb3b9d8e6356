//! Assembly Table Benchmarks
//!
//! Measures fragment ingestion throughput for typical headset frame sizes
//! (one eye, 1200-byte fragments) in order and shuffled.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::time::{Duration, Instant};
use vssp_core::fragment::{FrameDescriptor, Fragmenter};
use vssp_core::{AssemblyTable, CompletionPolicy, FragmentHeader, InsertOutcome};

const FRAMES_PER_ITER: u32 = 30;

fn datagrams_for(frame_len: usize, shuffle: bool) -> Vec<Vec<u8>> {
    let fragmenter = Fragmenter::default();
    let frame: Vec<u8> = (0..frame_len).map(|i| (i % 251) as u8).collect();
    let mut rng = StdRng::seed_from_u64(7);
    let mut all = Vec::new();
    for frame_id in 0..FRAMES_PER_ITER {
        let descriptor = FrameDescriptor {
            frame_id,
            ..Default::default()
        };
        let mut datagrams = fragmenter.split(&frame, &descriptor).unwrap();
        if shuffle {
            datagrams.shuffle(&mut rng);
        }
        all.extend(datagrams);
    }
    all
}

fn ingest(datagrams: &[Vec<u8>], policy: CompletionPolicy) -> usize {
    let mut table = AssemblyTable::new(policy, 30);
    let now = Instant::now();
    let mut completed = 0;
    for datagram in datagrams {
        let (header, payload) = FragmentHeader::parse(datagram).unwrap();
        if let InsertOutcome::Completed(frame) = table.insert(&header, payload, now) {
            completed += frame.bytes.len();
        }
    }
    table.sweep(now + Duration::from_secs(1), Duration::from_millis(200));
    completed
}

fn bench_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("assembly_ingest");
    group.measurement_time(Duration::from_secs(5));

    for frame_len in [16 * 1024usize, 128 * 1024, 512 * 1024] {
        for shuffle in [false, true] {
            let datagrams = datagrams_for(frame_len, shuffle);
            let label = if shuffle { "shuffled" } else { "ordered" };
            group.throughput(Throughput::Bytes(frame_len as u64 * FRAMES_PER_ITER as u64));
            group.bench_with_input(
                BenchmarkId::new(label, frame_len),
                &datagrams,
                |b, datagrams| b.iter(|| ingest(black_box(datagrams), CompletionPolicy::Exact)),
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_ingest);
criterion_main!(benches);
