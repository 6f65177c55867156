//! Timeseries Extraction
//!
//! Stateless conversion of a sequence into parallel `(times, values)` arrays,
//! with times in seconds relative to the first sample. Also provides the
//! interval and histogram views used for offline analysis.

use std::io::{self, Write};

use serde::Serialize;

use super::clock::nanos_to_secs;
use super::sample::TraceSequence;

/// Relative times (seconds) and values of a sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Timeseries {
    pub times: Vec<f64>,
    pub values: Vec<f64>,
}

/// Extract a timeseries without touching any cursor state.
pub fn extract(sequence: &TraceSequence) -> Timeseries {
    let origin = sequence.first().timestamp;
    let (times, values) = sequence
        .iter()
        .map(|s| (nanos_to_secs(s.timestamp - origin), s.value))
        .unzip();
    Timeseries { times, values }
}

impl Timeseries {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Intervals between consecutive samples.
    pub fn deltas(&self) -> Vec<f64> {
        self.times.windows(2).map(|w| w[1] - w[0]).collect()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.times.iter().copied().zip(self.values.iter().copied())
    }

    /// Write one `"time value"` line per sample.
    pub fn write_pairs<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for (t, v) in self.pairs() {
            writeln!(out, "{} {}", t, v)?;
        }
        Ok(())
    }
}

/// Equal-width histogram over the data range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    /// Samples per bin.
    pub counts: Vec<u64>,
    /// Bin edges, `counts.len() + 1` of them.
    pub edges: Vec<f64>,
}

/// Bin `data` into `bins` equal-width bins spanning `[min, max]`; the last bin
/// is closed on the right. A constant series is centered in a range of width 1.
/// Returns `None` for empty data or zero bins.
pub fn histogram(data: &[f64], bins: usize) -> Option<Histogram> {
    if data.is_empty() || bins == 0 {
        return None;
    }

    let (mut lo, mut hi) = data
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }

    let width = (hi - lo) / bins as f64;
    let edges: Vec<f64> = (0..=bins).map(|i| lo + width * i as f64).collect();

    let mut counts = vec![0u64; bins];
    for &v in data {
        let bin = (((v - lo) / width) as usize).min(bins - 1);
        counts[bin] += 1;
    }

    Some(Histogram { counts, edges })
}

impl Histogram {
    /// Write `"left_edge count"` for every non-empty bin.
    pub fn write_nonzero<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for (count, edge) in self.counts.iter().zip(&self.edges) {
            if *count > 0 {
                writeln!(out, "{} {}", edge, count)?;
            }
        }
        Ok(())
    }
}
