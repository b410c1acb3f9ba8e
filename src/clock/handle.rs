//! Per-track clock handles and role-specific behavior
//!
//! Each output or decoder thread owns one [`Clock`] bound to a role: the
//! master recalibrates the shared mapping from its reference samples, slaves
//! convert through it, and the input roles mirror the demuxer side (an input
//! master demotes any track master to slave behavior for as long as it
//! lives). Every operation requires the session lock, taken through
//! [`Clock::lock`].

use std::cell::Cell;
use std::sync::{Arc, MutexGuard};

use crate::assert_invariant;
use crate::clock::main::{trace_calibration, MainClock, MainInner, MainState};
use crate::clock::{ClockPoint, TrackCategory, UpdateCallbacks};
use crate::tick::Tick;
use crate::trace::trace_render;

/// Reject a reference sample when the instantaneous coefficient leaves
/// [1.0 - THRESHOLD, 1.0 + THRESHOLD]
const COEFF_THRESHOLD: f64 = 0.2;

/// Maximum believable gap between a track's first timestamp and the PCR
const PCR_MAX_GAP: Tick = Tick::from_seconds(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClockRole {
    Master,
    InputMaster,
    Slave,
    InputSlave,
}

/// Per-track clock handle
///
/// Owned by the track's output thread (`Send`, not `Sync`). Dropping the
/// handle unregisters it from the session; the input master, if any, must be
/// the last handle dropped.
pub struct Clock {
    owner: Arc<MainInner>,
    role: ClockRole,
    priority: u32,
    track: String,
    cbs: Option<Box<dyn UpdateCallbacks>>,
    /// Track-side delay, always >= 0; guarded by the session lock
    delay: Cell<Tick>,
}

impl MainClock {
    /// Create the master clock of the session
    ///
    /// At most one master may exist at a time. If an input master is ever
    /// created, this clock behaves as a slave for the rest of its life.
    pub fn create_master(
        &self,
        track_id: &str,
        cbs: Option<Box<dyn UpdateCallbacks>>,
    ) -> Clock {
        let mut state = self.inner.state.lock().expect("lock poisoned");
        assert_invariant!(
            !state.has_master,
            "at most one master clock per session",
            "clock"
        );
        state.has_master = true;
        state.handles += 1;
        drop(state);

        // The master always has the highest arbitration priority.
        Clock {
            owner: self.inner.clone(),
            role: ClockRole::Master,
            priority: 0,
            track: track_id.to_string(),
            cbs,
            delay: Cell::new(Tick::ZERO),
        }
    }

    /// Create the input master, driven directly by the demuxer's PCR
    ///
    /// Demotes any current or future track master to slave behavior. Must be
    /// created before the mapping is first calibrated, and must outlive every
    /// other handle of the session.
    pub fn create_input_master(&self) -> Clock {
        let mut state = self.inner.state.lock().expect("lock poisoned");
        assert_invariant!(
            !state.has_input_master,
            "at most one input master clock per session",
            "clock"
        );
        debug_assert!(
            !state.offset.is_valid(),
            "input master must be created before the first calibration"
        );
        state.has_input_master = true;
        state.handles += 1;
        drop(state);

        Clock {
            owner: self.inner.clone(),
            role: ClockRole::InputMaster,
            priority: 0,
            track: "input".to_string(),
            cbs: None,
            delay: Cell::new(Tick::ZERO),
        }
    }

    /// Create an input-side clock that only consumes the mapping
    pub fn create_input_slave(&self) -> Clock {
        let mut state = self.inner.state.lock().expect("lock poisoned");
        state.handles += 1;
        drop(state);

        Clock {
            owner: self.inner.clone(),
            role: ClockRole::InputSlave,
            priority: 1,
            track: "input".to_string(),
            cbs: None,
            delay: Cell::new(Tick::ZERO),
        }
    }

    /// Create a slave clock for an output track
    pub fn create_slave(
        &self,
        track_id: &str,
        category: TrackCategory,
        cbs: Option<Box<dyn UpdateCallbacks>>,
    ) -> Clock {
        let mut state = self.inner.state.lock().expect("lock poisoned");
        state.handles += 1;
        drop(state);

        Clock {
            owner: self.inner.clone(),
            role: ClockRole::Slave,
            priority: category.priority(),
            track: track_id.to_string(),
            cbs,
            delay: Cell::new(Tick::ZERO),
        }
    }
}

impl Clock {
    /// Create another slave sharing this clock's session and track id
    pub fn create_slave(&self, category: TrackCategory) -> Clock {
        let mut state = self.owner.state.lock().expect("lock poisoned");
        state.handles += 1;
        drop(state);

        Clock {
            owner: self.owner.clone(),
            role: ClockRole::Slave,
            priority: category.priority(),
            track: self.track.clone(),
            cbs: None,
            delay: Cell::new(Tick::ZERO),
        }
    }

    /// Take the session lock
    ///
    /// All clock operations live on the returned guard; bracket several calls
    /// in one guard scope to make them atomic with respect to other tracks.
    pub fn lock(&self) -> ClockGuard<'_> {
        ClockGuard {
            clock: self,
            state: Some(self.owner.state.lock().expect("lock poisoned")),
        }
    }

    /// Convert a stream timestamp to system time, locking internally
    pub fn convert_to_system(&self, system_now: Tick, ts: Tick, rate: f64) -> Tick {
        self.lock().to_system(system_now, ts, rate)
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        // Teardown must finish even when a panicking thread poisoned the
        // session lock; a second panic here would abort the process.
        let mut state = self
            .owner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match self.role {
            ClockRole::InputMaster => {
                assert_invariant!(
                    state.handles == 1,
                    "input master clock must be deleted last",
                    "clock"
                );
                state.has_input_master = false;
            }
            ClockRole::Master => {
                // A master demoted by an input master may have seeded slave
                // state before the demotion; drop the calibration with it.
                if state.has_input_master {
                    state.reset_mapping();
                    self.owner.cond.notify_all();
                }
                state.has_master = false;
            }
            ClockRole::Slave | ClockRole::InputSlave => {}
        }
        state.handles -= 1;
    }
}

/// Locked view of one track's clock
///
/// Deadlines computed through a guard are only valid while the state they
/// were derived from holds: after every [`wait`](ClockGuard::wait) wake-up,
/// re-read the mapping and recompute.
pub struct ClockGuard<'a> {
    clock: &'a Clock,
    state: Option<MutexGuard<'a, MainState>>,
}

impl<'a> ClockGuard<'a> {
    fn state(&mut self) -> &mut MainState {
        self.state.as_mut().expect("guard held")
    }

    fn state_ref(&self) -> &MainState {
        self.state.as_ref().expect("guard held")
    }

    /// True while this clock drives the shared mapping
    fn is_driving(&self) -> bool {
        match self.clock.role {
            ClockRole::InputMaster => true,
            ClockRole::Master => !self.state_ref().has_input_master,
            ClockRole::Slave | ClockRole::InputSlave => false,
        }
    }

    /// Feed a reference sample and return the drift against system time
    ///
    /// For the driving clock this recalibrates the mapping and returns
    /// `Tick::INVALID` (a master has no drift against itself). For slaves it
    /// returns `computed_system - system_now`. Passing `Tick::MAX` as
    /// `system_now` forces a listener notification without recalibration
    /// (render while paused).
    pub fn update(&mut self, system_now: Tick, ts: Tick, rate: f64) -> Tick {
        self.update_dispatch(system_now, ts, rate, 0, 0)
    }

    /// Same as [`update`](ClockGuard::update), carrying the video frame rate
    /// through to the update callback
    pub fn update_video(
        &mut self,
        system_now: Tick,
        ts: Tick,
        rate: f64,
        frame_rate: u32,
        frame_rate_base: u32,
    ) -> Tick {
        self.update_dispatch(system_now, ts, rate, frame_rate, frame_rate_base)
    }

    fn update_dispatch(
        &mut self,
        system_now: Tick,
        ts: Tick,
        rate: f64,
        frame_rate: u32,
        frame_rate_base: u32,
    ) -> Tick {
        if self.is_driving() {
            self.master_update(system_now, ts, rate, frame_rate, frame_rate_base)
        } else {
            self.slave_update(system_now, ts, rate, frame_rate, frame_rate_base)
        }
    }

    /// Drop this clock's sync state after a track-level discontinuity
    pub fn reset(&mut self) {
        if self.is_driving() {
            self.master_reset()
        } else {
            self.slave_reset()
        }
    }

    /// Change this track's user-requested delay, returning the applied delta
    ///
    /// The positive part of a master delay stays on the track; a decrease is
    /// pushed as a negative share onto the session so every slave observes it
    /// through its own conversion. The sum of both sides is conserved.
    pub fn set_delay(&mut self, delay: Tick) -> Tick {
        if self.is_driving() {
            self.master_set_delay(delay)
        } else {
            self.slave_set_delay(delay)
        }
    }

    /// Convert a stream timestamp to the system time it should render at
    pub fn to_system(&mut self, system_now: Tick, ts: Tick, rate: f64) -> Tick {
        if self.is_driving() {
            self.master_to_system(system_now, ts, rate)
        } else {
            self.slave_to_system(system_now, ts, rate)
        }
    }

    /// Establish the initial render reference for this track
    ///
    /// The input master records the session start time and anchors the
    /// mapping there; it may be called once per reset cycle. Output clocks
    /// pre-seed the wait-sync reference from the start time so the very first
    /// frame gets a sane deadline before any update cycle completes.
    pub fn start(&mut self, system_now: Tick, first_ts: Tick) {
        match self.clock.role {
            ClockRole::InputMaster => {
                let state = self.state();
                debug_assert!(
                    !state.start_time.is_valid(),
                    "start may only be called once per reset cycle"
                );
                state.start_time = ClockPoint::new(system_now, first_ts);
                state.offset = Tick::ZERO;
                self.clock.owner.cond.notify_all();
            }
            ClockRole::Master | ClockRole::Slave => {
                let priority = self.clock.priority;
                let state = self.state();
                if !state.start_time.is_valid() || priority >= state.wait_sync_ref_priority {
                    return;
                }
                let start_time = state.start_time;
                let delay = wait_sync_delay(state, start_time, system_now, first_ts, 1.0);
                state.wait_sync_ref_priority = priority;
                state.wait_sync_ref = ClockPoint::new(system_now + delay, first_ts);
            }
            // The input slave never renders, it cannot claim the reference.
            ClockRole::InputSlave => {}
        }
    }

    /// Whether the session is paused
    pub fn is_paused(&self) -> bool {
        self.state_ref().pause_date.is_valid()
    }

    /// This track's current delay, always >= 0 for a driving clock
    pub fn delay(&self) -> Tick {
        self.clock.delay.get()
    }

    /// Block until `deadline` (system time) or until any clock-changing call
    /// broadcasts, whichever comes first
    ///
    /// Returns true if signaled, false on timeout. The state the deadline was
    /// computed from may have changed on any wake-up: callers must re-read
    /// the mapping, recompute their deadline and loop.
    pub fn wait(&mut self, deadline: Tick) -> bool {
        let guard = self.state.take().expect("guard held");
        let (guard, timeout) = self
            .clock
            .owner
            .cond
            .wait_timeout(guard, deadline.duration_until())
            .expect("lock poisoned");
        self.state = Some(guard);
        !timeout.timed_out()
    }

    /// Wake every waiter of the session unconditionally
    ///
    /// For callers that mutated external state (e.g. playback rate) affecting
    /// pending deadlines without going through an update.
    pub fn wake(&self) {
        self.clock.owner.cond.notify_all();
    }

    fn notify_update(
        &self,
        system: Tick,
        ts: Tick,
        drift: Tick,
        rate: f64,
        frame_rate: u32,
        frame_rate_base: u32,
    ) {
        if let Some(cbs) = &self.clock.cbs {
            cbs.on_update(system, ts, rate, frame_rate, frame_rate_base);
        }
        if let Some(tracer) = &self.clock.owner.tracer {
            if system.is_valid() {
                trace_render(tracer.as_ref(), &self.clock.track, system, ts, drift);
            }
        }
    }

    fn master_update(
        &mut self,
        system_now: Tick,
        ts: Tick,
        rate: f64,
        frame_rate: u32,
        frame_rate_base: u32,
    ) -> Tick {
        if !ts.is_valid() || system_now == Tick::INVALID {
            return Tick::INVALID;
        }

        // Tick::MAX forces the update: skip recalibration, only notify the
        // new clock point.
        if system_now != Tick::MAX {
            let state = self.state();
            if state.offset.is_valid() && state.last.is_valid() && ts != state.last.stream {
                if rate == state.rate {
                    let system_diff = system_now - state.last.system;
                    let stream_diff = ts - state.last.stream;
                    let instant_coeff =
                        system_diff.as_micros() as f64 / stream_diff.as_micros() as f64 * rate;

                    // Both timelines must be incrementing and the instant
                    // coefficient must stay around 1.0.
                    let decreasing_ts = system_diff < Tick::ZERO || stream_diff < Tick::ZERO;
                    let coefficient_unstable = instant_coeff > 1.0 + COEFF_THRESHOLD
                        || instant_coeff < 1.0 - COEFF_THRESHOLD;

                    if decreasing_ts || coefficient_unstable {
                        if decreasing_ts {
                            log::warn!(
                                "resetting master clock: decreasing ts: system: {}, stream: {}",
                                system_diff,
                                stream_diff
                            );
                        } else {
                            log::warn!(
                                "resetting master clock: coefficient too unstable: {}",
                                instant_coeff
                            );
                        }
                        if let Some(tracer) = &self.clock.owner.tracer {
                            tracer.trace_event(&self.clock.track, "reset_bad_source");
                        }
                        let state = self.state();
                        state.send_discontinuity();
                        // Reset and continue: the offset is recomputed below
                        // from the current sample, so playback does not
                        // glitch.
                        state.reset_mapping();
                    } else {
                        let state = self.state();
                        state.coeff_avg.update(instant_coeff);
                        state.coeff = state.coeff_avg.get();
                    }
                }
            } else {
                // First sample of a calibration cycle (or a repeated stream
                // ts): re-arm the fallback reference and report the
                // discontinuity.
                let state = self.state();
                state.wait_sync_ref_priority = u32::MAX;
                state.wait_sync_ref = ClockPoint::INVALID;
                state.send_discontinuity();
            }

            let state = self.state();
            let origin = state.start_origin();
            state.offset =
                system_now - (ts - origin.stream).scale(state.coeff / rate) - origin.system;
            state.last = ClockPoint::new(system_now, ts);
            state.rate = rate;

            if let Some(tracer) = &self.clock.owner.tracer {
                let (offset, coeff) = (self.state_ref().offset, self.state_ref().coeff);
                trace_calibration(tracer.as_ref(), &self.clock.track, offset, coeff);
            }
            self.clock.owner.cond.notify_all();
        }

        // Fix the reported ts if both the master and the slaves are delayed.
        // Happens after a positive master delay was applied, then lowered.
        let mut ts = ts;
        let shared_delay = self.state_ref().delay;
        if self.clock.delay.get() > Tick::ZERO && shared_delay < Tick::ZERO && ts > -shared_delay {
            ts += shared_delay;
        }

        let drift = Tick::INVALID;
        self.notify_update(system_now, ts, drift, rate, frame_rate, frame_rate_base);
        drift
    }

    fn master_reset(&mut self) {
        let clock = self.clock;
        if let Some(tracer) = &clock.owner.tracer {
            tracer.trace_event(&clock.track, "reset_user");
        }
        let state = self.state();
        state.reset_mapping();

        assert_invariant!(
            state.delay <= Tick::ZERO,
            "master-side delay must never be positive",
            "clock"
        );
        assert_invariant!(
            clock.delay.get() >= Tick::ZERO,
            "track delay must never be negative",
            "clock"
        );

        // Merge both delay shares and re-split them by sign, so the sum is
        // conserved across the reset.
        if clock.delay.get() != Tick::ZERO && state.delay != Tick::ZERO {
            let delta = clock.delay.get() + state.delay;
            if delta > Tick::ZERO {
                clock.delay.set(delta);
                state.delay = Tick::ZERO;
            } else {
                clock.delay.set(Tick::ZERO);
                state.delay = delta;
            }
        }
        clock.owner.cond.notify_all();

        self.notify_update(Tick::INVALID, Tick::INVALID, Tick::INVALID, 1.0, 0, 0);
    }

    fn master_set_delay(&mut self, delay: Tick) -> Tick {
        let delta = delay - self.clock.delay.get();

        if delta > Tick::ZERO {
            // The master track itself is delayed.
            self.state().delay = Tick::ZERO;
            self.clock.delay.set(delay);
        } else {
            // Delay all slave tracks instead of advancing the master.
            self.state().delay = delta;
        }

        assert_invariant!(
            self.state_ref().delay <= Tick::ZERO,
            "master-side delay must never be positive",
            "clock"
        );
        assert_invariant!(
            self.clock.delay.get() >= Tick::ZERO,
            "track delay must never be negative",
            "clock"
        );

        self.clock.owner.cond.notify_all();
        delta
    }

    fn slave_update(
        &mut self,
        system_now: Tick,
        ts: Tick,
        rate: f64,
        frame_rate: u32,
        frame_rate_base: u32,
    ) -> Tick {
        if system_now == Tick::MAX {
            // Forced update: notify the new clock point without touching
            // anything.
            self.notify_update(Tick::MAX, ts, Tick::INVALID, rate, frame_rate, frame_rate_base);
            return Tick::MAX;
        }
        if !ts.is_valid() || !system_now.is_valid() {
            return Tick::INVALID;
        }

        let computed = self.to_system(system_now, ts, rate);
        let drift = computed - system_now;
        self.notify_update(computed, ts, drift, rate, frame_rate, frame_rate_base);
        drift
    }

    fn slave_reset(&mut self) {
        let state = self.state();
        state.wait_sync_ref_priority = u32::MAX;
        state.wait_sync_ref = ClockPoint::INVALID;
        self.clock.owner.cond.notify_all();

        self.notify_update(Tick::INVALID, Tick::INVALID, Tick::INVALID, 1.0, 0, 0);
    }

    fn slave_set_delay(&mut self, delay: Tick) -> Tick {
        self.clock.delay.set(delay);
        self.clock.owner.cond.notify_all();
        Tick::ZERO
    }

    fn master_to_system(&mut self, system_now: Tick, ts: Tick, rate: f64) -> Tick {
        let system = self.state_ref().stream_to_system(ts);
        if system.is_valid() {
            system
        } else {
            // No master sync point yet, fall back to the monotonic reference.
            self.monotonic_to_system(system_now, ts, rate)
        }
    }

    fn slave_to_system(&mut self, system_now: Tick, ts: Tick, rate: f64) -> Tick {
        let system = self.state_ref().stream_to_system(ts);
        let system = if system.is_valid() {
            system
        } else {
            self.monotonic_to_system(system_now, ts, rate)
        };

        // The track's own user-requested delay, minus the shared (negative)
        // master share, scaled by the playback rate.
        system + (self.clock.delay.get() - self.state_ref().delay).scale(rate)
    }

    /// Fallback conversion through the wait-sync reference point
    ///
    /// The first call from the highest-priority track claims the reference;
    /// later calls from lower-priority tracks reuse it.
    fn monotonic_to_system(&mut self, now: Tick, ts: Tick, rate: f64) -> Tick {
        let priority = self.clock.priority;
        let state = self.state();

        if priority < state.wait_sync_ref_priority {
            let first_pcr = state.first_pcr;
            let delay = wait_sync_delay(state, first_pcr, now, ts, rate);
            state.wait_sync_ref_priority = priority;
            state.wait_sync_ref = ClockPoint::new(now + delay, ts);
        }

        (ts - state.wait_sync_ref.stream).scale(1.0 / rate) + state.wait_sync_ref.system
    }
}

/// Startup slack for a track claiming the wait-sync reference
///
/// The PCR delay reproduces the gap between this track's first timestamp and
/// the recorded input reference point, so the output starts with the same
/// latency the input observed. Gaps beyond 60 s are considered bogus and
/// dropped.
fn wait_sync_delay(
    state: &MainState,
    reference: ClockPoint,
    now: Tick,
    ts: Tick,
    rate: f64,
) -> Tick {
    let mut pcr_delay = if reference.is_valid() {
        (ts - reference.stream).scale(1.0 / rate) + reference.system - now
    } else {
        Tick::ZERO
    };

    if pcr_delay > PCR_MAX_GAP {
        log::error!("invalid PCR delay {}, ignoring it", pcr_delay);
        pcr_delay = Tick::ZERO;
    }

    let input_delay = state.input_dejitter + pcr_delay;
    input_delay.max(state.output_dejitter)
}
