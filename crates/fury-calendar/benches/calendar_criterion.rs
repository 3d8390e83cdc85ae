//! Calendar benchmarks using criterion for historical comparison.

use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use fury_calendar::{Calendar, EventOptions};

fn schedule_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("schedule");

    for count in [100, 1000, 10000] {
        group.throughput(Throughput::Elements(count));

        group.bench_with_input(BenchmarkId::new("schedule_at", count), &count, |b, &count| {
            b.iter(|| {
                let calendar = Calendar::new(0.0);
                for i in 0..count {
                    // Reverse dates so every insertion lands at the front
                    let date = (count - i) as f64;
                    black_box(calendar.schedule_at(date, |_| {}).unwrap());
                }
            });
        });
    }

    group.finish();
}

fn firing_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("fire");

    for count in [100, 1000, 10000] {
        group.throughput(Throughput::Elements(count));

        group.bench_with_input(BenchmarkId::new("set_time", count), &count, |b, &count| {
            let hits = Arc::new(AtomicU64::new(0));
            b.iter(|| {
                let calendar = Calendar::new(0.0);
                for i in 0..count {
                    let hits = Arc::clone(&hits);
                    calendar
                        .schedule_at_with(
                            (i % 17) as f64,
                            EventOptions::default().priority((i % 3) as f64),
                            move |_| {
                                hits.fetch_add(1, Ordering::Relaxed);
                            },
                        )
                        .unwrap();
                }
                black_box(calendar.set_time(100.0).unwrap());
            });
        });

        group.bench_with_input(
            BenchmarkId::new("self_rescheduling", count),
            &count,
            |b, &count| {
                b.iter(|| {
                    let calendar = Calendar::new(0.0);
                    let limit = count as f64;
                    calendar
                        .schedule_at(1.0, move |fired| {
                            if fired.date() < limit {
                                fired.reschedule_after(1.0).unwrap();
                            }
                        })
                        .unwrap();
                    black_box(calendar.set_time(limit).unwrap());
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, schedule_benchmarks, firing_benchmarks);
criterion_main!(benches);
