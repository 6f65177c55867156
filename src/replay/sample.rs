//! Trace Samples and Sequences

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::clock::Nanos;

/// Measured metric carried by a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Round-trip time, milliseconds.
    Rtt,
    /// Throughput, megabits per second.
    Bandwidth,
}

impl Metric {
    pub const ALL: [Metric; 2] = [Metric::Rtt, Metric::Bandwidth];

    /// Suffix appended to the protocol to form a catalog `command`.
    pub fn command_suffix(&self) -> &'static str {
        match self {
            Self::Rtt => "RTT",
            Self::Bandwidth => "Bandwidth",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Self::Rtt => "ms",
            Self::Bandwidth => "Mbit/s",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rtt => "rtt",
            Self::Bandwidth => "bandwidth",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rtt" => Ok(Self::Rtt),
            "bandwidth" | "bw" => Ok(Self::Bandwidth),
            other => Err(format!("unknown metric '{}' (expected rtt or bandwidth)", other)),
        }
    }
}

/// One replayable sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceSample {
    /// Playback instant; shifted by stitching, compaction and re-basing.
    pub timestamp: Nanos,
    /// Original recording instant. Never mutated.
    pub absolute_timestamp: Nanos,
    pub value: f64,
}

/// Non-empty, time-ordered sequence of samples for one metric.
///
/// `timestamp` is non-decreasing across the sequence once it has been loaded;
/// every mutation offered here preserves that ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceSequence {
    samples: Vec<TraceSample>,
}

impl TraceSequence {
    /// Build a sequence from samples. Returns `None` if `samples` is empty or
    /// its playback timestamps decrease anywhere.
    pub fn from_samples(samples: Vec<TraceSample>) -> Option<Self> {
        let seq = Self { samples };
        if seq.samples.is_empty() || !seq.is_monotonic() {
            None
        } else {
            Some(seq)
        }
    }

    /// Wrap samples that are known to be non-empty (a recording holds at least two).
    pub(crate) fn from_nonempty(samples: Vec<TraceSample>) -> Self {
        debug_assert!(!samples.is_empty(), "TraceSequence: empty sample list");
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first(&self) -> &TraceSample {
        &self.samples[0]
    }

    pub fn last(&self) -> &TraceSample {
        &self.samples[self.samples.len() - 1]
    }

    pub fn get(&self, index: usize) -> Option<&TraceSample> {
        self.samples.get(index)
    }

    pub fn samples(&self) -> &[TraceSample] {
        &self.samples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TraceSample> {
        self.samples.iter()
    }

    /// Playback distance between the first and the last sample.
    pub fn span(&self) -> Nanos {
        self.last().timestamp - self.first().timestamp
    }

    /// Check the ordering invariant.
    pub fn is_monotonic(&self) -> bool {
        self.samples
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp)
    }

    /// Shift every playback timestamp forward by `delta`.
    pub(crate) fn shift_forward(&mut self, delta: Nanos) {
        for sample in &mut self.samples {
            sample.timestamp = sample.timestamp.saturating_add(delta);
        }
    }

    pub(crate) fn samples_mut(&mut self) -> &mut [TraceSample] {
        &mut self.samples
    }
}

impl<'a> IntoIterator for &'a TraceSequence {
    type Item = &'a TraceSample;
    type IntoIter = std::slice::Iter<'a, TraceSample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}
