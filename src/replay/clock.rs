//! Playback Clock
//!
//! Nanosecond timestamps shared by recordings, sequences and cursors.
//! Recording wall-clock times carry no zone and are read as UTC.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Nanoseconds since Unix epoch (1970-01-01 00:00:00 UTC).
pub type Nanos = i64;

/// Conversion constants
pub const NANOS_PER_MILLI: i64 = 1_000_000;
pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Timestamp layout used by recording files.
pub const RECORDING_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Virtual playback clock of a replay cursor.
///
/// Only moves forward; the cursor commits elapsed time through `advance_by`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackClock {
    current: Nanos,
}

impl PlaybackClock {
    #[inline]
    pub fn new(start_time: Nanos) -> Self {
        Self {
            current: start_time,
        }
    }

    /// Current playback time in nanoseconds.
    #[inline]
    pub fn now(&self) -> Nanos {
        self.current
    }

    /// Playback time reached after `delta` more nanoseconds.
    #[inline]
    pub fn peek(&self, delta: Nanos) -> Nanos {
        self.current.saturating_add(delta)
    }

    /// Advance clock by a delta. Panics in debug builds if delta is negative.
    #[inline]
    pub fn advance_by(&mut self, delta: Nanos) {
        debug_assert!(delta >= 0, "PlaybackClock: delta must be non-negative");
        self.current = self.current.saturating_add(delta);
    }
}

impl fmt::Display for PlaybackClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_timestamp(self.current))
    }
}

/// Convert a duration in seconds to nanoseconds.
///
/// Returns `None` for negative, NaN or out-of-range inputs.
pub fn secs_to_nanos(secs: f64) -> Option<Nanos> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    let nanos = (secs * NANOS_PER_SEC as f64).round();
    if nanos > i64::MAX as f64 {
        return None;
    }
    Some(nanos as Nanos)
}

/// Convert a nanosecond span to fractional seconds.
#[inline]
pub fn nanos_to_secs(nanos: Nanos) -> f64 {
    nanos as f64 / NANOS_PER_SEC as f64
}

/// Helper to convert Nanos to chrono DateTime.
#[inline]
pub fn nanos_to_datetime(nanos: Nanos) -> DateTime<Utc> {
    Utc.timestamp_nanos(nanos)
}

/// Parse a recording timestamp (`YYYY-MM-DD HH:MM:SS.ffffff`, fraction optional).
pub fn parse_recording_timestamp(s: &str) -> Option<Nanos> {
    NaiveDateTime::parse_from_str(s.trim(), RECORDING_TIMESTAMP_FORMAT)
        .ok()
        .and_then(|naive| naive.and_utc().timestamp_nanos_opt())
}

/// Render Nanos in the recording layout with microsecond precision.
pub fn format_timestamp(nanos: Nanos) -> String {
    nanos_to_datetime(nanos)
        .format("%Y-%m-%d %H:%M:%S%.6f")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances() {
        let mut clock = PlaybackClock::new(1_000_000_000);
        assert_eq!(clock.peek(500), 1_000_000_500);
        assert_eq!(clock.now(), 1_000_000_000);

        clock.advance_by(500_000_000);
        assert_eq!(clock.now(), 1_500_000_000);
    }

    #[test]
    fn test_parse_recording_timestamp() {
        let ts = parse_recording_timestamp("2020-01-01 00:00:05.250000").unwrap();
        let base = parse_recording_timestamp("2020-01-01 00:00:00.000000").unwrap();
        assert_eq!(ts - base, 5_250 * NANOS_PER_MILLI);

        // Fraction is optional
        let whole = parse_recording_timestamp(" 2020-01-01 00:00:05 ").unwrap();
        assert_eq!(whole - base, 5 * NANOS_PER_SEC);

        assert!(parse_recording_timestamp("2020-01-01T00:00:00").is_none());
        assert!(parse_recording_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_format_timestamp() {
        let ts = parse_recording_timestamp("2020-01-24 15:36:55.123456").unwrap();
        assert_eq!(format_timestamp(ts), "2020-01-24 15:36:55.123456");
    }

    #[test]
    fn test_secs_to_nanos() {
        assert_eq!(secs_to_nanos(1.5), Some(1_500_000_000));
        assert_eq!(secs_to_nanos(0.0), Some(0));
        assert_eq!(secs_to_nanos(-1.0), None);
        assert_eq!(secs_to_nanos(f64::NAN), None);
        assert_eq!(secs_to_nanos(f64::INFINITY), None);
        assert!((nanos_to_secs(2_500_000_000) - 2.5).abs() < 1e-12);
    }
}
