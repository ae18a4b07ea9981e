//! Benchmarks for the archive engine.
//!
//! Run with: cargo bench --package alopex-archiver
//!
//! ## Benchmark Categories
//!
//! - **Codec**: sample encode/decode
//! - **Append**: lock/add buffer/add value write path
//! - **Read**: forward cursor scan, time lookup, bucketing

use alopex_archiver::iter::BucketingIterator;
use alopex_archiver::{
    Archive, ArchiveConfig, Channel, CtrlInfo, DbrType, EpicsTime, Sample, ValueIterator,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

const BUFFER_SIZE: usize = 256;

/// Slowly varying samples one second apart.
fn generate_samples(count: usize) -> Vec<Sample> {
    let start = EpicsTime::new(1_000_000, 0);
    let mut value = 50.0;
    (0..count)
        .map(|i| {
            value += (i as f64 * 0.1).sin() * 0.1;
            Sample::double(start.add_secs(i as f64), value)
        })
        .collect()
}

fn append_all(channel: &mut Channel, samples: &[Sample]) {
    let info = CtrlInfo::numeric(3, "mm", 0.0, 100.0, 0.0, 0.0, 0.0, 0.0);
    for sample in samples {
        if channel.lock_buffer(sample, 1.0).unwrap() == 0 || !channel.add_value(sample).unwrap() {
            channel.add_buffer(sample, &info, 1.0, BUFFER_SIZE).unwrap();
            channel.add_value(sample).unwrap();
        }
    }
    channel.release_buffer();
}

fn filled_archive(count: usize) -> (TempDir, Archive, Channel) {
    let dir = TempDir::new().unwrap();
    let archive = Archive::open(dir.path().join("directory"), ArchiveConfig::for_write()).unwrap();
    let mut channel = archive.add_channel("bench:pv").unwrap();
    append_all(&mut channel, &generate_samples(count));
    (dir, archive, channel)
}

fn bench_sample_codec(c: &mut Criterion) {
    let sample = Sample::double(EpicsTime::new(1_000_000, 500), 3.25);
    let bytes = sample.encode();

    c.bench_function("sample_encode", |b| b.iter(|| black_box(&sample).encode()));
    c.bench_function("sample_decode", |b| {
        b.iter(|| Sample::decode(black_box(&bytes), DbrType::Double, 1).unwrap())
    });
}

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel_append");

    for size in [1_000usize, 10_000].iter() {
        let samples = generate_samples(*size);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &samples, |b, samples| {
            b.iter_batched(
                || {
                    let dir = TempDir::new().unwrap();
                    let archive =
                        Archive::open(dir.path().join("directory"), ArchiveConfig::for_write())
                            .unwrap();
                    let channel = archive.add_channel("bench:pv").unwrap();
                    (dir, archive, channel)
                },
                |(_dir, _archive, mut channel)| append_all(&mut channel, samples),
                criterion::BatchSize::PerIteration,
            )
        });
    }

    group.finish();
}

fn bench_forward_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("cursor_scan");

    for size in [1_000usize, 10_000].iter() {
        let (_dir, archive, channel) = filled_archive(*size);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_function(BenchmarkId::from_parameter(size), |b| {
            b.iter(|| {
                let mut cursor = archive.new_cursor();
                channel.first_value(&mut cursor).unwrap();
                let mut sum = 0.0;
                while cursor.is_valid() {
                    sum += cursor.value().unwrap().to_double(0).unwrap();
                    cursor.next().unwrap();
                }
                black_box(sum)
            })
        });
    }

    group.finish();
}

fn bench_time_lookup(c: &mut Criterion) {
    let (_dir, archive, channel) = filled_archive(10_000);
    let target = EpicsTime::new(1_000_000, 0).add_secs(7_777.5);

    c.bench_function("value_after_time_10k", |b| {
        b.iter(|| {
            let mut cursor = archive.new_cursor();
            channel.value_after_time(black_box(target), &mut cursor).unwrap()
        })
    });
}

fn bench_bucketing(c: &mut Criterion) {
    let (_dir, archive, channel) = filled_archive(10_000);

    c.bench_function("bucketing_60s_10k", |b| {
        b.iter(|| {
            let mut cursor = archive.new_cursor();
            channel.first_value(&mut cursor).unwrap();
            let mut iter = BucketingIterator::new(cursor, 60.0).unwrap();
            let mut points = 0usize;
            while iter.is_valid() {
                points += 1;
                if !iter.next().unwrap() {
                    break;
                }
            }
            black_box(points)
        })
    });
}

criterion_group!(
    benches,
    bench_sample_codec,
    bench_append,
    bench_forward_scan,
    bench_time_lookup,
    bench_bucketing,
);

criterion_main!(benches);
