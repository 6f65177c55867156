//! Gap Compaction
//!
//! Caps every silence in a sequence at `max_gap`: when two consecutive samples
//! are further apart than that, the rest of the sequence is pulled earlier by the
//! excess. All other spacings stay exactly as recorded.

use tracing::debug;

use super::clock::{nanos_to_secs, Nanos};
use super::sample::TraceSequence;

/// What a compaction pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionStats {
    /// Number of gaps that exceeded the maximum.
    pub gaps_compacted: usize,
    /// Playback time removed from the sequence in total.
    pub removed: Nanos,
}

/// Compact `sequence` in place so no consecutive gap exceeds `max_gap`.
pub fn compact(sequence: &mut TraceSequence, max_gap: Nanos) -> CompactionStats {
    let mut stats = CompactionStats::default();
    let samples = sequence.samples_mut();
    let mut previous = samples[0].timestamp;

    for sample in samples.iter_mut() {
        sample.timestamp -= stats.removed;

        let gap = sample.timestamp - previous;
        if gap > max_gap {
            let excess = gap - max_gap;
            sample.timestamp -= excess;
            stats.removed += excess;
            stats.gaps_compacted += 1;
        }

        previous = sample.timestamp;
    }

    debug!(
        "Compacted {} gaps above {:.3}s, removed {:.3}s",
        stats.gaps_compacted,
        nanos_to_secs(max_gap),
        nanos_to_secs(stats.removed)
    );

    stats
}
