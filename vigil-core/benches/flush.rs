use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use serde_json::json;
use vigil_core::reactive::{observe, Value, Watcher, WatcherOptions};
use vigil_core::schedule::run_microtasks;

fn fan_out(watchers: usize) -> (Value, Vec<Watcher>) {
    let data = Value::from_json(json!({"n": 0}));
    observe(&data, true);
    let watchers = (0..watchers)
        .map(|_| {
            Watcher::new(
                &data,
                "n",
                |value, _| {
                    black_box(value);
                    Ok(())
                },
                WatcherOptions::default(),
            )
            .unwrap()
        })
        .collect();
    (data, watchers)
}

fn bench_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("flush");

    for size in [10, 100, 1000] {
        group.bench_function(format!("fan_out_{size}"), |b| {
            b.iter_batched(
                || fan_out(size),
                |(data, watchers)| {
                    data.as_record().unwrap().assign("n", 1);
                    run_microtasks();
                    for watcher in black_box(watchers) {
                        watcher.teardown();
                    }
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.bench_function("burst_coalesces", |b| {
        let (data, _watchers) = fan_out(10);
        let record = data.as_record().unwrap().clone();
        let mut n = 0.0;
        b.iter(|| {
            for _ in 0..100 {
                n += 1.0;
                record.assign("n", n);
            }
            run_microtasks();
        })
    });

    group.finish();
}

criterion_group!(benches, bench_flush);
criterion_main!(benches);
