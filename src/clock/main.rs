//! Shared clock hub: the authoritative stream-to-system mapping
//!
//! `MainClock` owns the state shared by every per-track [`Clock`](crate::Clock) handle of a
//! playback session: the linear mapping (coefficient, rate, offset, start
//! point), the wait-sync fallback reference, pause state, the master-side
//! delay, and the listener registry. A single mutex/condvar pair protects it
//! all; locked operations live on [`MainClockGuard`] so holding the lock is
//! enforced by the type system.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::average::Average;
use crate::clock::{ClockEvents, ClockPoint};
use crate::config::SyncConfig;
use crate::tick::Tick;
use crate::trace::{ClockTracer, TraceField};

/// Handle to a registered listener, used for removal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

pub(crate) struct ListenerEntry {
    id: ListenerId,
    cbs: Arc<dyn ClockEvents>,
}

/// Mutable session state, guarded by `MainInner::state`
pub(crate) struct MainState {
    /// Linear mapping:
    /// `system = (stream - start.stream) * coeff / rate + offset + start.system`
    pub coeff: f64,
    pub rate: f64,
    pub offset: Tick,
    pub coeff_avg: Average,

    /// Most recent master reference sample
    pub last: ClockPoint,
    /// Initial reference established by the input master, once per reset cycle
    pub start_time: ClockPoint,
    /// First program clock reference supplied by the demuxer
    pub first_pcr: ClockPoint,

    /// Monotonic fallback reference used before the mapping is calibrated
    pub wait_sync_ref: ClockPoint,
    /// Priority of the track owning `wait_sync_ref`; lower wins
    pub wait_sync_ref_priority: u32,

    /// Master-side delay, always <= 0; the positive part lives on the track
    pub delay: Tick,
    pub pause_date: Tick,

    pub input_dejitter: Tick,
    pub output_dejitter: Tick,

    listeners: Vec<ListenerEntry>,
    next_listener_id: u64,

    /// Live handle bookkeeping, used to enforce creation/deletion contracts
    pub has_master: bool,
    pub has_input_master: bool,
    pub handles: u32,
}

impl MainState {
    fn new(config: &SyncConfig) -> Self {
        Self {
            coeff: 1.0,
            rate: 1.0,
            offset: Tick::INVALID,
            coeff_avg: {
                let mut avg = Average::new(config.coeff_average_range);
                avg.reset_and_fill(1.0);
                avg
            },
            last: ClockPoint::INVALID,
            start_time: ClockPoint::INVALID,
            first_pcr: ClockPoint::INVALID,
            wait_sync_ref: ClockPoint::INVALID,
            wait_sync_ref_priority: u32::MAX,
            delay: Tick::ZERO,
            pause_date: Tick::INVALID,
            input_dejitter: Tick::from_millis(config.input_dejitter_ms),
            output_dejitter: Tick::from_millis(config.output_dejitter_ms),
            listeners: Vec::new(),
            next_listener_id: 0,
            has_master: false,
            has_input_master: false,
            handles: 0,
        }
    }

    /// Drop the current calibration, keeping session-level references
    /// (`first_pcr`, `start_time`, dejitter, delays) intact
    pub(crate) fn reset_mapping(&mut self) {
        self.coeff = 1.0;
        self.rate = 1.0;
        self.offset = Tick::INVALID;
        self.coeff_avg.reset_and_fill(self.coeff);
        self.wait_sync_ref = ClockPoint::INVALID;
        self.wait_sync_ref_priority = u32::MAX;
        self.last = ClockPoint::INVALID;
    }

    /// Origin of the linear mapping, the zero point until a start time is set
    pub(crate) fn start_origin(&self) -> ClockPoint {
        if self.start_time.is_valid() {
            self.start_time
        } else {
            ClockPoint::new(Tick::ZERO, Tick::ZERO)
        }
    }

    /// Apply the master mapping, `Tick::INVALID` if not yet calibrated
    pub(crate) fn stream_to_system(&self, ts: Tick) -> Tick {
        if !self.offset.is_valid() {
            return Tick::INVALID;
        }
        let origin = self.start_origin();
        (ts - origin.stream).scale(self.coeff / self.rate) + self.offset + origin.system
    }

    /// Fire the discontinuity event on every registered listener
    pub(crate) fn send_discontinuity(&self) {
        for entry in &self.listeners {
            entry.cbs.on_discontinuity();
        }
    }
}

/// Shared core referenced by `MainClock` and every `Clock` handle
pub(crate) struct MainInner {
    pub state: Mutex<MainState>,
    pub cond: Condvar,
    pub tracer: Option<Arc<dyn ClockTracer>>,
}

impl Drop for MainInner {
    fn drop(&mut self) {
        if let Ok(state) = self.state.lock() {
            debug_assert!(
                state.listeners.is_empty(),
                "listeners must be removed before the session ends"
            );
        }
    }
}

/// Session-wide clock hub
///
/// Cheap to clone; all clones and all [`Clock`](crate::Clock) handles created
/// from it share the same state.
#[derive(Clone)]
pub struct MainClock {
    pub(crate) inner: Arc<MainInner>,
}

impl MainClock {
    pub fn new() -> Self {
        Self::build(&SyncConfig::default(), None)
    }

    pub fn with_tracer(tracer: Arc<dyn ClockTracer>) -> Self {
        Self::build(&SyncConfig::default(), Some(tracer))
    }

    pub fn with_config(config: &SyncConfig) -> Self {
        Self::build(config, None)
    }

    pub fn build(config: &SyncConfig, tracer: Option<Arc<dyn ClockTracer>>) -> Self {
        Self {
            inner: Arc::new(MainInner {
                state: Mutex::new(MainState::new(config)),
                cond: Condvar::new(),
                tracer,
            }),
        }
    }

    /// Take the session lock
    ///
    /// Bracket several clock operations in one guard scope to make them
    /// atomic with respect to other tracks.
    pub fn lock(&self) -> MainClockGuard<'_> {
        MainClockGuard {
            inner: &self.inner,
            state: self.inner.state.lock().expect("lock poisoned"),
        }
    }
}

impl Default for MainClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Locked view of the session hub
pub struct MainClockGuard<'a> {
    pub(crate) inner: &'a MainInner,
    pub(crate) state: MutexGuard<'a, MainState>,
}

impl MainClockGuard<'_> {
    /// Restore the neutral mapping, e.g. on seek or stream discontinuity
    ///
    /// Clears the calibration, the monotonic fallback reference, the first
    /// PCR and the start time, then wakes every waiter.
    pub fn reset(&mut self) {
        self.state.reset_mapping();
        self.state.first_pcr = ClockPoint::INVALID;
        self.state.start_time = ClockPoint::INVALID;
        self.inner.cond.notify_all();
    }

    /// Record the first program clock reference of a new program
    ///
    /// Any previous calibration is void once the input signals a new PCR
    /// origin, so the mapping is reset and the fallback reference re-armed.
    pub fn set_first_pcr(&mut self, system: Tick, ts: Tick) {
        self.state.reset_mapping();
        self.state.first_pcr = ClockPoint::new(system, ts);
        self.inner.cond.notify_all();
    }

    /// Minimum slack absorbing input-side jitter before the first render
    pub fn set_input_dejitter(&mut self, delay: Tick) {
        self.state.input_dejitter = delay;
    }

    /// Minimum slack absorbing output-side jitter before the first render
    ///
    /// Also the maximum delay before synchronization is considered active.
    pub fn set_dejitter(&mut self, dejitter: Tick) {
        self.state.output_dejitter = dejitter;
    }

    /// Toggle pause at the given system time
    ///
    /// On resume, every stored absolute system reference is shifted by the
    /// pause duration so the calibration survives arbitrarily long pauses.
    /// Pause and resume must strictly alternate.
    pub fn change_pause(&mut self, now: Tick, paused: bool) {
        let state = &mut *self.state;
        debug_assert!(
            paused != state.pause_date.is_valid(),
            "pause and resume must alternate"
        );

        if paused {
            state.pause_date = now;
            return;
        }

        let delay = now - state.pause_date;
        // Only shift fields holding a reference; a stream paused then seeked
        // has nothing to preserve.
        if state.offset.is_valid() {
            if state.last.is_valid() {
                state.last.system += delay;
            }
            // The mapping carries exactly one absolute term: the start
            // anchor when one exists, the offset otherwise.
            if !state.start_time.is_valid() {
                state.offset += delay;
            }
        }
        if state.first_pcr.is_valid() {
            state.first_pcr.system += delay;
        }
        if state.start_time.is_valid() {
            state.start_time.system += delay;
        }
        if state.wait_sync_ref.is_valid() {
            state.wait_sync_ref.system += delay;
        }
        state.pause_date = Tick::INVALID;
        self.inner.cond.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.state.pause_date.is_valid()
    }

    /// Register a listener for session events
    pub fn add_listener(&mut self, cbs: Arc<dyn ClockEvents>) -> ListenerId {
        let state = &mut *self.state;
        let id = ListenerId(state.next_listener_id);
        state.next_listener_id += 1;
        state.listeners.push(ListenerEntry { id, cbs });
        id
    }

    /// Unregister a listener; the id must come from this session
    pub fn remove_listener(&mut self, id: ListenerId) {
        let state = &mut *self.state;
        match state.listeners.iter().position(|entry| entry.id == id) {
            // Ordering is irrelevant, swap_remove keeps removal O(1).
            Some(idx) => {
                state.listeners.swap_remove(idx);
            }
            None => debug_assert!(false, "unknown listener id"),
        }
    }

    /// Current smoothed speed coefficient (nominally 1.0)
    pub fn coeff(&self) -> f64 {
        self.state.coeff
    }

    /// Master-side delay share, always <= 0
    pub fn master_delay(&self) -> Tick {
        self.state.delay
    }

    /// Wake every thread blocked in [`ClockGuard::wait`](crate::ClockGuard::wait)
    ///
    /// For callers mutating external state (e.g. playback rate) that affects
    /// pending deadlines without going through an update.
    pub fn wake(&self) {
        self.inner.cond.notify_all();
    }
}

/// Emit the post-recalibration offset/coefficient trace record
pub(crate) fn trace_calibration(tracer: &dyn ClockTracer, track: &str, offset: Tick, coeff: f64) {
    tracer.trace(
        Tick::now(),
        &[
            TraceField::str("type", "RENDER"),
            TraceField::str("id", track),
            TraceField::tick("offset", offset),
            TraceField::float("coeff", coeff),
        ],
    );
}
