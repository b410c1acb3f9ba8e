//! Property-Based Tests for the CrabClock synchronization engine
//!
//! These tests verify invariants and contracts of the clock core using
//! proptest for input generation and shrinking.
//!
//! Run with: cargo test --test clock_props

use proptest::prelude::*;

use crabclock::{Average, MainClock, SyncConfig, Tick, TrackCategory};

fn ms(v: i64) -> Tick {
    Tick::from_millis(v)
}

fn test_config() -> SyncConfig {
    SyncConfig {
        input_dejitter_ms: 10,
        output_dejitter_ms: 20,
        coeff_average_range: 10,
    }
}

proptest! {
    /// INVARIANT: after any sequence of master delay changes, the master-side
    /// share is never positive and the track-side share never negative, and
    /// the reported delta matches the track delay change.
    #[test]
    fn master_delay_shares_keep_their_signs(
        delays in prop::collection::vec(0i64..10_000, 1..20),
    ) {
        let main = MainClock::with_config(&test_config());
        let master = main.create_master("audio/0", None);

        for d in delays {
            master.lock().set_delay(ms(d));
            prop_assert!(main.lock().master_delay() <= Tick::ZERO);
            prop_assert!(master.lock().delay() >= Tick::ZERO);
        }
    }

    /// INVARIANT: the sum of track delay and master-side delay observed
    /// before a master reset equals the sum observed after it.
    #[test]
    fn delay_sum_is_conserved_across_reset(
        delays in prop::collection::vec(0i64..10_000, 1..20),
    ) {
        let main = MainClock::with_config(&test_config());
        let master = main.create_master("audio/0", None);

        for d in delays {
            master.lock().set_delay(ms(d));
        }
        let track_before = master.lock().delay();
        let before = track_before + main.lock().master_delay();
        master.lock().reset();
        let track_after = master.lock().delay();
        let after = track_after + main.lock().master_delay();
        prop_assert_eq!(before, after);
    }

    /// INVARIANT: a calibrated identity mapping is exactly linear; a slave
    /// with zero delay sees system == ts + offset for any stream timestamp.
    #[test]
    fn calibrated_mapping_is_linear(
        offset_ms in 0i64..1_000_000,
        ts_ms in -1_000_000i64..1_000_000,
    ) {
        let main = MainClock::with_config(&test_config());
        let master = main.create_master("audio/0", None);
        let video = main.create_slave("video/0", TrackCategory::Video, None);

        master.lock().update(ms(offset_ms), ms(0), 1.0);
        let system = video.lock().to_system(ms(offset_ms), ms(ts_ms), 1.0);
        prop_assert_eq!(system, ms(ts_ms + offset_ms));
    }

    /// INVARIANT: conversion through a calibrated mapping is monotonic in
    /// the stream timestamp.
    #[test]
    fn conversion_is_monotonic(
        ts_a in 0i64..500_000,
        ts_b in 0i64..500_000,
    ) {
        let main = MainClock::with_config(&test_config());
        let master = main.create_master("audio/0", None);
        let video = main.create_slave("video/0", TrackCategory::Video, None);

        master.lock().update(ms(1000), ms(0), 1.0);
        let (lo, hi) = if ts_a <= ts_b { (ts_a, ts_b) } else { (ts_b, ts_a) };
        let sys_lo = video.lock().to_system(ms(1000), ms(lo), 1.0);
        let sys_hi = video.lock().to_system(ms(1000), ms(hi), 1.0);
        prop_assert!(sys_lo <= sys_hi);
    }

    /// INVARIANT: the smoothed coefficient stays within the bounds of the
    /// samples fed into it once seeded.
    #[test]
    fn average_stays_within_sample_bounds(
        samples in prop::collection::vec(0.8f64..1.2, 1..50),
    ) {
        let mut avg = Average::new(10);
        avg.reset_and_fill(1.0);
        for s in &samples {
            avg.update(*s);
        }
        prop_assert!(avg.get() >= 0.8 - 1e-9);
        prop_assert!(avg.get() <= 1.2 + 1e-9);
    }

    /// INVARIANT: samples within the stability window never trigger a
    /// discontinuity; the coefficient tracks the true rate within the window.
    #[test]
    fn stable_samples_keep_coeff_in_window(
        // Stream steps of 100ms with system steps within +/-15%.
        jitters in prop::collection::vec(-15i64..15, 2..30),
    ) {
        let main = MainClock::with_config(&test_config());
        let master = main.create_master("audio/0", None);

        let mut system = 0i64;
        let mut stream = 0i64;
        master.lock().update(ms(system), ms(stream), 1.0);
        for j in jitters {
            system += 100 + j;
            stream += 100;
            master.lock().update(ms(system), ms(stream), 1.0);
        }
        let coeff = main.lock().coeff();
        prop_assert!(coeff > 0.8 && coeff < 1.2, "coeff out of window: {}", coeff);
    }
}
