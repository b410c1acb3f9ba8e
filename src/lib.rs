//! CrabClock: Multi-track audio/video clock synchronization engine
//!
//! This crate maps per-track media timestamps onto a shared wall-clock
//! timeline so that audio, video and subtitle outputs render in sync despite
//! independent decode rates, startup latency and timestamp discontinuities.
//!
//! # Features
//! - Live drift estimation with numerical-stability safeguards
//! - Master/slave arbitration between simultaneous timing authorities
//! - Input-level reference clock taking over any promoted track master
//! - Pause/resume without losing calibration
//! - Runtime delay adjustment, conserved between master and slave sides
//! - Thread-safe: one handle per output thread, one lock per session
//!
//! # Usage
//! ```rust
//! use crabclock::{MainClock, Tick, TrackCategory};
//!
//! let main = MainClock::new();
//! let master = main.create_master("audio/0", None);
//! let video = main.create_slave("video/0", TrackCategory::Video, None);
//!
//! // Audio output thread: calibrate from each scheduled frame.
//! let mut m = master.lock();
//! m.update(Tick::from_millis(100), Tick::ZERO, 1.0);
//! drop(m);
//!
//! // Video output thread: convert and wait until the render deadline.
//! let mut v = video.lock();
//! let deadline = v.to_system(Tick::from_millis(101), Tick::from_millis(20), 1.0);
//! while deadline > Tick::now() {
//!     if v.wait(deadline) {
//!         break; // signaled: the mapping changed, recompute the deadline
//!     }
//! }
//! ```

pub mod average;
pub mod clock;
pub mod config;
pub mod errors;
pub mod invariant_ppt;
pub mod tick;
pub mod trace;

// Re-exports for convenience
pub use average::Average;
pub use clock::{
    Clock, ClockEvents, ClockGuard, ClockPoint, ListenerId, MainClock, MainClockGuard,
    TrackCategory, UpdateCallbacks,
};
pub use config::SyncConfig;
pub use errors::ClockError;
pub use tick::Tick;
pub use trace::{ClockTracer, TraceField, TraceValue};

/// Initialize logging for the synchronization engine
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "crabclock=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
