//! Multi-track clock synchronization engine
//!
//! One [`MainClock`] per playback session holds the authoritative linear
//! mapping from stream time to system time. A single master track
//! recalibrates the mapping on every frame it schedules; every other track
//! converts its timestamps through it. Before the first calibration, slave
//! tracks fall back to a monotonic reference point arbitrated by priority
//! (audio/video before subtitles).
//!
//! Submodules:
//! - `main`: the shared hub (mapping state, pause, dejitter, listeners)
//! - `handle`: per-track [`Clock`] handles with role-specific behavior

mod handle;
mod main;

pub use handle::{Clock, ClockGuard};
pub use main::{ListenerId, MainClock, MainClockGuard};

use crate::tick::Tick;

/// One synchronized reference sample: a system time paired with the stream
/// time that maps onto it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockPoint {
    pub system: Tick,
    pub stream: Tick,
}

impl ClockPoint {
    pub const INVALID: ClockPoint = ClockPoint {
        system: Tick::INVALID,
        stream: Tick::INVALID,
    };

    pub const fn new(system: Tick, stream: Tick) -> Self {
        Self { system, stream }
    }

    /// True if the point carries a usable system reference
    pub const fn is_valid(&self) -> bool {
        self.system.is_valid()
    }
}

/// Output track category, used to derive sync-reference priority
///
/// Subtitle outputs depend on a video output, so their fallback reference
/// point must always lose arbitration against audio or video tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackCategory {
    Video,
    Audio,
    Subtitle,
}

impl TrackCategory {
    pub(crate) fn priority(self) -> u32 {
        match self {
            TrackCategory::Video | TrackCategory::Audio => 1,
            TrackCategory::Subtitle => 2,
        }
    }
}

/// Session-level clock events, delivered to registered listeners
///
/// Callbacks run synchronously while the clock lock is held: they must not
/// re-enter the clock and must return quickly.
pub trait ClockEvents: Send + Sync {
    /// The mapping was reset or a reference sample was rejected
    fn on_discontinuity(&self);
}

/// Per-track update notifications
///
/// `system` is the system date at which `ts` will be rendered
/// ([`Tick::INVALID`] when the clock is reset, [`Tick::MAX`] for a forced
/// update while paused). `frame_rate`/`frame_rate_base` are only set by
/// video updates.
pub trait UpdateCallbacks: Send {
    fn on_update(&self, system: Tick, ts: Tick, rate: f64, frame_rate: u32, frame_rate_base: u32);
}
