//! Replay Cursor
//!
//! Piecewise-constant resampling of an irregularly sampled sequence. Each call
//! to [`ReplayCursor::advance`] moves the virtual playback clock forward and
//! returns the most recent sample whose timestamp has been reached.
//!
//! Past the last sample the cursor waits `max_gap` (an inferred trailing gap)
//! and then wraps to the first sample. On every wrap the whole sequence is
//! re-based forward by `span + max_gap`, so playback timestamps keep increasing
//! across any number of loops.

use std::fmt;

use tracing::{debug, warn};

use super::clock::{format_timestamp, secs_to_nanos, Nanos, PlaybackClock};
use super::sample::{Metric, TraceSequence};

/// Value returned for one step of playback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplaySample {
    pub value: f64,
    /// Virtual playback time after the step.
    pub playback_timestamp: Nanos,
    /// Original recording time of the returned sample.
    pub absolute_timestamp: Nanos,
}

/// Errors raised by cursor construction or stepping.
#[derive(Debug, Clone, PartialEq)]
pub enum CursorError {
    /// Elapsed time was negative, NaN or infinite.
    InvalidStep(f64),
    /// `span + max_gap` is zero, so playback could never leave the first sample.
    ZeroPeriod(Metric),
    /// `max_gap` is so large that the first wrap would overflow the timestamp range.
    PeriodOverflow(Metric),
}

impl fmt::Display for CursorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidStep(secs) => write!(f, "invalid elapsed time: {} s", secs),
            Self::ZeroPeriod(metric) => write!(
                f,
                "{} sequence has zero replay period (no time span and max gap 0)",
                metric
            ),
            Self::PeriodOverflow(metric) => write!(
                f,
                "{} sequence cannot wrap: replay period overflows the timestamp range",
                metric
            ),
        }
    }
}

impl std::error::Error for CursorError {}

/// Stateful per-metric playback over a compacted sequence.
#[derive(Debug, Clone)]
pub struct ReplayCursor {
    metric: Metric,
    sequence: TraceSequence,
    index: usize,
    clock: PlaybackClock,
    max_gap: Nanos,
    wraps: u64,
}

impl ReplayCursor {
    /// Start at the first sample, with playback time equal to its timestamp.
    pub fn new(metric: Metric, sequence: TraceSequence, max_gap: Nanos) -> Result<Self, CursorError> {
        let period = sequence
            .span()
            .checked_add(max_gap)
            .ok_or(CursorError::PeriodOverflow(metric))?;
        if period <= 0 {
            return Err(CursorError::ZeroPeriod(metric));
        }
        if sequence.last().timestamp.checked_add(period).is_none() {
            return Err(CursorError::PeriodOverflow(metric));
        }
        let clock = PlaybackClock::new(sequence.first().timestamp);
        Ok(Self {
            metric,
            sequence,
            index: 0,
            clock,
            max_gap,
            wraps: 0,
        })
    }

    /// Advance playback by `seconds` and return the current sample.
    pub fn advance(&mut self, seconds: f64) -> Result<ReplaySample, CursorError> {
        let delta = secs_to_nanos(seconds).ok_or(CursorError::InvalidStep(seconds))?;
        Ok(self.advance_nanos(delta))
    }

    /// Advance playback by `delta` nanoseconds. Cost is linear in samples skipped.
    pub fn advance_nanos(&mut self, delta: Nanos) -> ReplaySample {
        let target = self.clock.peek(delta.max(0));

        while target >= self.next_timestamp() {
            let next = (self.index + 1) % self.sequence.len();
            // Hold the last sample once timestamps can no longer be re-based
            if next == 0 && !self.rebase() {
                break;
            }
            self.index = next;
        }

        self.clock.advance_by(delta.max(0));

        let sample = &self.sequence.samples()[self.index];
        ReplaySample {
            value: sample.value,
            playback_timestamp: self.clock.now(),
            absolute_timestamp: sample.absolute_timestamp,
        }
    }

    /// Timestamp at which the cursor moves past the current sample.
    fn next_timestamp(&self) -> Nanos {
        match self.sequence.get(self.index + 1) {
            Some(next) => next.timestamp,
            None => self.sequence.last().timestamp.saturating_add(self.max_gap),
        }
    }

    /// Playback length of one loop of the sequence.
    pub fn period(&self) -> Nanos {
        self.sequence.span().saturating_add(self.max_gap)
    }

    /// Shift the sequence one period forward. Returns false, leaving it in
    /// place, when the shifted timestamps would overflow.
    fn rebase(&mut self) -> bool {
        let period = self.period();
        if self.sequence.last().timestamp.checked_add(period).is_none() {
            warn!(
                "{} cursor cannot wrap past {}; holding last sample",
                self.metric,
                format_timestamp(self.sequence.last().timestamp)
            );
            return false;
        }
        self.sequence.shift_forward(period);
        self.wraps += 1;

        debug!(
            "{} cursor wrapped (loop {}), sequence now starts at {}",
            self.metric,
            self.wraps,
            format_timestamp(self.sequence.first().timestamp)
        );
        true
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn playback_timestamp(&self) -> Nanos {
        self.clock.now()
    }

    /// Number of times playback has looped back to the first sample.
    pub fn wraps(&self) -> u64 {
        self.wraps
    }

    pub fn max_gap(&self) -> Nanos {
        self.max_gap
    }

    /// The sequence with its current (possibly re-based) timestamps.
    pub fn sequence(&self) -> &TraceSequence {
        &self.sequence
    }
}
