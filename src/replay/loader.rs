//! Seam-Stitching Trace Loader
//!
//! Turns a finite recording into one monotonic sequence that starts at a chosen
//! sample. The tail of the recording (from the start index on) is emitted as
//! recorded; the head is appended behind it, re-timed so that it continues
//! where the tail ends:
//!
//! ```text
//! recording:  r0 r1 r2 | r3 r4 r5        start index s = 3
//! sequence:   r3 r4 r5 r0' r1' r2'       ri'.timestamp = r5.abs + (ri.abs - r0.abs)
//! ```
//!
//! The absolute timestamp of the start sample is returned as the anchor so that
//! a companion metric can start at the same real time.

use rand::Rng;
use tracing::debug;

use super::clock::{format_timestamp, Nanos};
use super::recording::Recording;
use super::sample::{TraceSample, TraceSequence};

/// Where the stitched sequence begins.
pub enum StartPosition<'a, R: Rng + ?Sized> {
    /// Uniformly random index in `[1, len - 1]`.
    Random(&'a mut R),
    /// Last sample recorded at or before the anchor time.
    Anchor(Nanos),
    /// Explicit index; clamped to the last sample.
    Index(usize),
}

/// Result of a load: the stitched sequence and the anchor time it started at.
#[derive(Debug, Clone)]
pub struct LoadedTrace {
    pub sequence: TraceSequence,
    pub anchor: Nanos,
    pub start_index: usize,
}

/// Stitch `recording` into a monotonic sequence starting at `start`.
pub fn load<R: Rng + ?Sized>(recording: &Recording, start: StartPosition<'_, R>) -> LoadedTrace {
    let samples = recording.samples();
    let len = samples.len();

    let start_index = match start {
        StartPosition::Random(rng) => rng.gen_range(1..len),
        StartPosition::Anchor(anchor) => anchor_index(recording, anchor),
        StartPosition::Index(index) => index.min(len - 1),
    };

    let first_abs = recording.first_timestamp();
    let last_abs = recording.last_timestamp();

    let tail = samples[start_index..].iter().map(|s| TraceSample {
        timestamp: s.absolute_timestamp,
        absolute_timestamp: s.absolute_timestamp,
        value: s.value,
    });
    let head = samples[..start_index].iter().map(|s| TraceSample {
        timestamp: last_abs + (s.absolute_timestamp - first_abs),
        absolute_timestamp: s.absolute_timestamp,
        value: s.value,
    });

    let stitched: Vec<TraceSample> = tail.chain(head).collect();
    let anchor = samples[start_index].absolute_timestamp;

    debug!(
        "Stitched {} samples from index {} (anchor {})",
        stitched.len(),
        start_index,
        format_timestamp(anchor)
    );

    LoadedTrace {
        sequence: TraceSequence::from_nonempty(stitched),
        anchor,
        start_index,
    }
}

/// Index of the last sample whose absolute timestamp is `<= anchor`, or 0 if none.
pub fn anchor_index(recording: &Recording, anchor: Nanos) -> usize {
    recording
        .samples()
        .partition_point(|s| s.absolute_timestamp <= anchor)
        .saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::clock::NANOS_PER_SEC;
    use crate::replay::recording::RecordedSample;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn recording(offsets_secs: &[i64]) -> Recording {
        let base = 1_577_836_800 * NANOS_PER_SEC; // 2020-01-01
        Recording::from_samples(
            offsets_secs
                .iter()
                .enumerate()
                .map(|(i, off)| RecordedSample {
                    absolute_timestamp: base + off * NANOS_PER_SEC,
                    value: i as f64,
                })
                .collect(),
        )
        .unwrap()
    }

    type NoRng = ChaCha8Rng;

    #[test]
    fn test_stitch_from_index() {
        let rec = recording(&[0, 5, 40]);
        let loaded = load::<NoRng>(&rec, StartPosition::Index(1));
        let seq = &loaded.sequence;

        assert_eq!(loaded.start_index, 1);
        assert_eq!(loaded.anchor, rec.samples()[1].absolute_timestamp);
        assert_eq!(seq.len(), 3);

        let values: Vec<f64> = seq.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![1.0, 2.0, 0.0]);

        // Wrapped head continues right after the tail
        assert_eq!(seq.samples()[2].timestamp, rec.last_timestamp());
        assert_eq!(seq.samples()[2].absolute_timestamp, rec.first_timestamp());
        assert!(seq.is_monotonic());
    }

    #[test]
    fn test_every_start_index_is_monotonic() {
        let rec = recording(&[0, 1, 1, 4, 9, 30, 31]);
        for s in 1..rec.len() {
            let loaded = load::<NoRng>(&rec, StartPosition::Index(s));
            assert_eq!(loaded.sequence.len(), rec.len());
            assert!(loaded.sequence.is_monotonic(), "start {}", s);
        }
    }

    #[test]
    fn test_random_start_never_zero() {
        let rec = recording(&[0, 10]);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..50 {
            let loaded = load(&rec, StartPosition::Random(&mut rng));
            assert_eq!(loaded.start_index, 1);
        }

        let rec = recording(&[0, 1, 2, 3, 4, 5]);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..200 {
            let loaded = load(&rec, StartPosition::Random(&mut rng));
            assert!((1..rec.len()).contains(&loaded.start_index));
        }
    }

    #[test]
    fn test_random_start_is_seeded() {
        let rec = recording(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        let mut a = ChaCha8Rng::seed_from_u64(42);
        let mut b = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..10 {
            let la = load(&rec, StartPosition::Random(&mut a));
            let lb = load(&rec, StartPosition::Random(&mut b));
            assert_eq!(la.start_index, lb.start_index);
        }
    }

    #[test]
    fn test_anchor_selection() {
        let rec = recording(&[10, 20, 30]);
        let at = |secs: i64| rec.first_timestamp() + (secs - 10) * NANOS_PER_SEC;

        // Before everything
        assert_eq!(anchor_index(&rec, at(0)), 0);
        // Exactly on a sample
        assert_eq!(anchor_index(&rec, at(20)), 1);
        // Between samples
        assert_eq!(anchor_index(&rec, at(25)), 1);
        // After everything
        assert_eq!(anchor_index(&rec, at(99)), 2);
    }

    #[test]
    fn test_anchor_aligns_companion_metric() {
        let rtt = recording(&[0, 3, 7, 12, 20]);
        let bw = recording(&[1, 4, 6, 11, 15, 19]);
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        for _ in 0..20 {
            let first = load(&rtt, StartPosition::Random(&mut rng));
            let second = load::<NoRng>(&bw, StartPosition::Anchor(first.anchor));

            let seq = second.sequence.samples();
            assert!(seq[0].absolute_timestamp <= first.anchor);
            if second.start_index + 1 < bw.len() {
                assert!(seq[1].absolute_timestamp > first.anchor);
            }
        }
    }

    #[test]
    fn test_index_clamped() {
        let rec = recording(&[0, 1, 2]);
        let loaded = load::<NoRng>(&rec, StartPosition::Index(99));
        assert_eq!(loaded.start_index, 2);
        assert!(loaded.sequence.is_monotonic());
    }
}
