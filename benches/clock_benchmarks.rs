//! Performance benchmarks for the CrabClock hot path
//!
//! Run with: cargo bench
//!
//! Every frame of every track goes through update/convert while the session
//! lock is held, so these paths must stay cheap and allocation-free.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use crabclock::{MainClock, Tick, TrackCategory};

fn bench_master_update(c: &mut Criterion) {
    let main = MainClock::new();
    let master = main.create_master("audio/0", None);

    let mut system = 0i64;
    let mut stream = 0i64;
    c.bench_function("master_update", |b| {
        b.iter(|| {
            system += 21_333;
            stream += 21_333;
            let mut m = master.lock();
            black_box(m.update(
                Tick::from_micros(black_box(system)),
                Tick::from_micros(black_box(stream)),
                1.0,
            ))
        })
    });
}

fn bench_slave_convert(c: &mut Criterion) {
    let main = MainClock::new();
    let master = main.create_master("audio/0", None);
    let video = main.create_slave("video/0", TrackCategory::Video, None);

    master
        .lock()
        .update(Tick::from_millis(1000), Tick::ZERO, 1.0);

    let mut stream = 0i64;
    c.bench_function("slave_to_system", |b| {
        b.iter(|| {
            stream += 40_000;
            black_box(video.convert_to_system(
                Tick::from_millis(1001),
                Tick::from_micros(black_box(stream)),
                1.0,
            ))
        })
    });
}

criterion_group!(benches, bench_master_update, bench_slave_convert);
criterion_main!(benches);
