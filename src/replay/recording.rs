//! Recording File Reader
//!
//! A recording is a single line of comma-separated `"<timestamp>_<value>"` tokens,
//! e.g. `2020-01-24 15:36:55.000000_12.5,2020-01-24 15:36:56.000000_11.9`.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

use super::clock::{parse_recording_timestamp, Nanos};

/// A sample exactly as recorded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordedSample {
    pub absolute_timestamp: Nanos,
    pub value: f64,
}

/// Finite recording of one metric: at least two samples, non-decreasing in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    samples: Vec<RecordedSample>,
}

impl Recording {
    /// Build from already-parsed samples, enforcing the recording contract.
    pub fn from_samples(samples: Vec<RecordedSample>) -> Result<Self> {
        if samples.len() < 2 {
            bail!(
                "recording must contain at least 2 samples, found {}",
                samples.len()
            );
        }
        if let Some(i) = samples
            .windows(2)
            .position(|w| w[1].absolute_timestamp < w[0].absolute_timestamp)
        {
            bail!("recording timestamps decrease at sample {}", i + 1);
        }
        Ok(Self { samples })
    }

    /// Read and parse a recording file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read recording {}", path.display()))?;
        parse_recording(&content)
            .with_context(|| format!("Malformed recording {}", path.display()))
    }

    pub fn samples(&self) -> &[RecordedSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first_timestamp(&self) -> Nanos {
        self.samples[0].absolute_timestamp
    }

    pub fn last_timestamp(&self) -> Nanos {
        self.samples[self.samples.len() - 1].absolute_timestamp
    }
}

/// Parse recording text. Only the first line carries data.
pub fn parse_recording(content: &str) -> Result<Recording> {
    let line = content.lines().next().unwrap_or("");
    let mut samples = Vec::new();

    for (index, token) in line.split(',').enumerate() {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        samples.push(parse_token(token).with_context(|| format!("token {}: '{}'", index, token))?);
    }

    Recording::from_samples(samples)
}

fn parse_token(token: &str) -> Result<RecordedSample> {
    let Some((timestamp, value)) = token.rsplit_once('_') else {
        bail!("missing '_' separator");
    };
    let Some(absolute_timestamp) = parse_recording_timestamp(timestamp) else {
        bail!("invalid timestamp '{}'", timestamp.trim());
    };
    let value: f64 = value
        .trim()
        .parse()
        .with_context(|| format!("invalid value '{}'", value.trim()))?;
    if !value.is_finite() {
        bail!("non-finite value '{}'", value);
    }

    Ok(RecordedSample {
        absolute_timestamp,
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::clock::NANOS_PER_SEC;
    use std::io::Write;

    #[test]
    fn test_parse_recording() {
        let rec = parse_recording(
            "2020-01-01 00:00:00.000000_10.0, 2020-01-01 00:00:05.000000_12.0,2020-01-01 00:00:40.000000_9.0\n",
        )
        .unwrap();

        assert_eq!(rec.len(), 3);
        assert_eq!(rec.samples()[1].value, 12.0);
        assert_eq!(rec.last_timestamp() - rec.first_timestamp(), 40 * NANOS_PER_SEC);
    }

    #[test]
    fn test_trailing_comma_tolerated() {
        let rec = parse_recording(
            "2020-01-01 00:00:00.000000_1.5,2020-01-01 00:00:01.000000_2.5,",
        )
        .unwrap();
        assert_eq!(rec.len(), 2);
    }

    #[test]
    fn test_rejects_short_recording() {
        let err = parse_recording("2020-01-01 00:00:00.000000_1.5").unwrap_err();
        assert!(err.to_string().contains("at least 2 samples"));
        assert!(parse_recording("").is_err());
    }

    #[test]
    fn test_rejects_malformed_tokens() {
        assert!(parse_recording("2020-01-01 00:00:00.000000-1.5,2020-01-01 00:00:01.000000_2").is_err());
        assert!(parse_recording("2020-13-01 00:00:00.000000_1.5,2020-01-01 00:00:01.000000_2").is_err());
        assert!(parse_recording("2020-01-01 00:00:00.000000_abc,2020-01-01 00:00:01.000000_2").is_err());
    }

    #[test]
    fn test_rejects_decreasing_timestamps() {
        let err = parse_recording(
            "2020-01-01 00:00:05.000000_1,2020-01-01 00:00:01.000000_2",
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("decrease"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "2020-01-01 00:00:00.000000_3.0,2020-01-01 00:00:02.500000_4.0"
        )
        .unwrap();

        let rec = Recording::load(file.path()).unwrap();
        assert_eq!(rec.len(), 2);

        let missing = Recording::load(file.path().with_extension("missing"));
        assert!(missing.is_err());
    }
}
