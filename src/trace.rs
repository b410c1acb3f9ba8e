//! Structured trace sink for clock diagnostics
//!
//! The engine emits timestamped key/value records around every master
//! recalibration and every per-track render update. Tracing is optional: a
//! session without an installed tracer behaves identically and pays only an
//! `Option` check.

use crate::tick::Tick;

/// Value side of a trace record field
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TraceValue<'a> {
    Str(&'a str),
    Tick(Tick),
    Float(f64),
}

/// One key/value pair of a trace record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceField<'a> {
    pub key: &'a str,
    pub value: TraceValue<'a>,
}

impl<'a> TraceField<'a> {
    pub fn str(key: &'a str, value: &'a str) -> Self {
        Self {
            key,
            value: TraceValue::Str(value),
        }
    }

    pub fn tick(key: &'a str, value: Tick) -> Self {
        Self {
            key,
            value: TraceValue::Tick(value),
        }
    }

    pub fn float(key: &'a str, value: f64) -> Self {
        Self {
            key,
            value: TraceValue::Float(value),
        }
    }
}

/// Sink receiving clock trace records
///
/// Implementations must be cheap and non-blocking: records are emitted while
/// the clock lock is held.
pub trait ClockTracer: Send + Sync {
    /// Record `fields` against the given system timestamp
    fn trace(&self, ts: Tick, fields: &[TraceField<'_>]);

    /// Record a named one-shot event for a track (e.g. a mapping reset)
    fn trace_event(&self, track: &str, event: &str) {
        self.trace(
            Tick::now(),
            &[
                TraceField::str("type", "RENDER"),
                TraceField::str("id", track),
                TraceField::str("event", event),
            ],
        );
    }
}

/// Emit the pair of render records for one update of a track
///
/// One record is stamped "now" carrying the pts, deadline and drift; the
/// second is stamped at the render deadline itself so a trace viewer can plot
/// the scheduled timeline directly.
pub(crate) fn trace_render(
    tracer: &dyn ClockTracer,
    track: &str,
    render_ts: Tick,
    pts: Tick,
    drift: Tick,
) {
    if render_ts.is_valid() {
        tracer.trace(
            Tick::now(),
            &[
                TraceField::str("type", "RENDER"),
                TraceField::str("id", track),
                TraceField::tick("pts", pts),
                TraceField::tick("render_ts", render_ts),
                TraceField::tick("drift", drift),
            ],
        );
        tracer.trace(
            render_ts,
            &[
                TraceField::str("type", "RENDER"),
                TraceField::str("id", track),
                TraceField::tick("render_pts", pts),
                TraceField::tick("drift", drift),
            ],
        );
    } else {
        tracer.trace(
            Tick::now(),
            &[
                TraceField::str("type", "RENDER"),
                TraceField::str("id", track),
                TraceField::tick("pts", pts),
            ],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTracer {
        records: Mutex<Vec<(Tick, Vec<String>)>>,
    }

    impl ClockTracer for RecordingTracer {
        fn trace(&self, ts: Tick, fields: &[TraceField<'_>]) {
            let keys = fields.iter().map(|f| f.key.to_string()).collect();
            self.records.lock().expect("lock poisoned").push((ts, keys));
        }
    }

    #[test]
    fn test_render_trace_emits_two_records() {
        let tracer = RecordingTracer::default();
        let deadline = Tick::from_millis(500);
        trace_render(
            &tracer,
            "video/0",
            deadline,
            Tick::from_millis(490),
            Tick::from_millis(10),
        );
        let records = tracer.records.lock().expect("lock poisoned");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].0, deadline);
        assert!(records[0].1.contains(&"render_ts".to_string()));
        assert!(records[1].1.contains(&"render_pts".to_string()));
    }

    #[test]
    fn test_invalid_deadline_emits_single_record() {
        let tracer = RecordingTracer::default();
        trace_render(
            &tracer,
            "audio/0",
            Tick::INVALID,
            Tick::from_millis(100),
            Tick::INVALID,
        );
        let records = tracer.records.lock().expect("lock poisoned");
        assert_eq!(records.len(), 1);
    }
}
