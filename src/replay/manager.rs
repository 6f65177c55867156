//! Network Trace Manager
//!
//! Builds a ready-to-replay instance from a configuration:
//!
//! ```text
//! InstanceConfig ──▶ MappingCatalog ──▶ RTT file ──▶ load (random/start_time) ──┐ anchor
//!                                   └─▶ BW file  ──▶ load (anchored) ◀──────────┘
//!                                                        │
//!                                              compact both, build cursors
//! ```
//!
//! Construction either yields a manager whose every query succeeds or an
//! [`InvalidConfiguration`] describing which terminal status was reached.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use super::catalog::{CatalogField, MappingCatalog, MappingEntry, TraceFilter, TraceQuery};
use super::clock::{format_timestamp, Nanos};
use super::compact::compact;
use super::config::{ConfigSection, InstanceConfig};
use super::cursor::{CursorError, ReplayCursor, ReplaySample};
use super::loader::{self, StartPosition};
use super::recording::Recording;
use super::sample::Metric;
use super::timeseries::{extract, Timeseries};

/// Outcome of validating and loading an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceStatus {
    Ready,
    /// Required key missing or a value malformed.
    WrongConfiguration,
    /// No usable recording for one of the metrics.
    WrongInputFilePath,
}

impl InstanceStatus {
    /// Numeric status code (0 ready, negative on failure).
    pub fn code(&self) -> i32 {
        match self {
            Self::Ready => 0,
            Self::WrongConfiguration => -1,
            Self::WrongInputFilePath => -2,
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "READY"),
            Self::WrongConfiguration => write!(f, "WRONG_CONFIGURATION"),
            Self::WrongInputFilePath => write!(f, "WRONG_INPUTFILEPATH"),
        }
    }
}

/// The single failure kind raised by instance construction.
///
/// Callers that need to distinguish a bad configuration from a missing
/// recording inspect [`InvalidConfiguration::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidConfiguration {
    status: InstanceStatus,
    reason: String,
}

impl InvalidConfiguration {
    fn wrong_configuration(reason: impl Into<String>) -> Self {
        Self {
            status: InstanceStatus::WrongConfiguration,
            reason: reason.into(),
        }
    }

    fn wrong_input_file_path(reason: impl Into<String>) -> Self {
        Self {
            status: InstanceStatus::WrongInputFilePath,
            reason: reason.into(),
        }
    }

    pub fn status(&self) -> InstanceStatus {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for InvalidConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid configuration ({}): {}", self.status, self.reason)
    }
}

impl std::error::Error for InvalidConfiguration {}

/// Replays one RTT and one bandwidth recording for a configured experiment.
#[derive(Debug)]
pub struct NetworkTraceManager {
    config: InstanceConfig,
    catalog: MappingCatalog,
    rtt: ReplayCursor,
    bandwidth: ReplayCursor,
    rtt_file: PathBuf,
    bandwidth_file: PathBuf,
    anchor: Nanos,
}

impl NetworkTraceManager {
    /// Validate a raw section and build the instance.
    pub fn from_section(section: &ConfigSection) -> Result<Self, InvalidConfiguration> {
        let config = InstanceConfig::from_section(section).map_err(|e| {
            warn!("Rejected configuration: {}", e);
            InvalidConfiguration::wrong_configuration(e.to_string())
        })?;
        Self::new(config)
    }

    pub fn new(config: InstanceConfig) -> Result<Self, InvalidConfiguration> {
        log_configuration(&config);

        let catalog = MappingCatalog::load(&config.mapping_file)
            .map_err(|e| InvalidConfiguration::wrong_input_file_path(format!("{:#}", e)))?;

        let query = config.trace_query();
        if let Some(leg) = config.conflicting_leg() {
            warn!(
                "direction = {:?} but sender/receiver form the {} leg; selection follows the identities",
                config.direction, leg
            );
        }

        debug!("Trace query: {:?}", query);
        let rtt_file = resolve_file(&catalog, Metric::Rtt, &query, &config.mapping_file)?;
        let bandwidth_file = resolve_file(&catalog, Metric::Bandwidth, &query, &config.mapping_file)?;
        info!("rtt trace file: {}", rtt_file.display());
        info!("bandwidth trace file: {}", bandwidth_file.display());

        let rtt_recording = load_recording(&rtt_file)?;
        let bandwidth_recording = load_recording(&bandwidth_file)?;

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let start = match config.start_time {
            Some(start_time) => StartPosition::Anchor(start_time),
            None => StartPosition::Random(&mut rng),
        };
        let rtt_trace = loader::load(&rtt_recording, start);
        let bandwidth_trace = loader::load::<ChaCha8Rng>(
            &bandwidth_recording,
            StartPosition::Anchor(rtt_trace.anchor),
        );

        info!(
            "Replay starts at {} (rtt index {}, bandwidth index {})",
            format_timestamp(rtt_trace.anchor),
            rtt_trace.start_index,
            bandwidth_trace.start_index
        );

        let max_gap = config.max_tracegap();
        let anchor = rtt_trace.anchor;
        let mut rtt_sequence = rtt_trace.sequence;
        let mut bandwidth_sequence = bandwidth_trace.sequence;
        compact(&mut rtt_sequence, max_gap);
        compact(&mut bandwidth_sequence, max_gap);

        let rtt = ReplayCursor::new(Metric::Rtt, rtt_sequence, max_gap)
            .map_err(|e| InvalidConfiguration::wrong_configuration(e.to_string()))?;
        let bandwidth = ReplayCursor::new(Metric::Bandwidth, bandwidth_sequence, max_gap)
            .map_err(|e| InvalidConfiguration::wrong_configuration(e.to_string()))?;

        debug!(
            "rtt: {} samples starting {}, bandwidth: {} samples starting {}",
            rtt.sequence().len(),
            format_timestamp(rtt.playback_timestamp()),
            bandwidth.sequence().len(),
            format_timestamp(bandwidth.playback_timestamp())
        );

        Ok(Self {
            config,
            catalog,
            rtt,
            bandwidth,
            rtt_file,
            bandwidth_file,
            anchor,
        })
    }

    /// Advance one metric's playback by `seconds`.
    pub fn advance(&mut self, metric: Metric, seconds: f64) -> Result<ReplaySample, CursorError> {
        self.cursor_mut(metric).advance(seconds)
    }

    pub fn get_rtt(&mut self, seconds: f64) -> Result<ReplaySample, CursorError> {
        self.advance(Metric::Rtt, seconds)
    }

    pub fn get_bandwidth(&mut self, seconds: f64) -> Result<ReplaySample, CursorError> {
        self.advance(Metric::Bandwidth, seconds)
    }

    /// Advance both metrics by the same elapsed time. The two cursors are
    /// independent and may sit at different positions of their sequences.
    pub fn get_networkvalues(
        &mut self,
        seconds: f64,
    ) -> Result<(ReplaySample, ReplaySample), CursorError> {
        let rtt = self.get_rtt(seconds)?;
        let bandwidth = self.get_bandwidth(seconds)?;
        Ok((rtt, bandwidth))
    }

    pub fn timeseries(&self, metric: Metric) -> Timeseries {
        extract(self.cursor(metric).sequence())
    }

    pub fn get_rtt_timeseries(&self) -> Timeseries {
        self.timeseries(Metric::Rtt)
    }

    pub fn get_bandwidth_timeseries(&self) -> Timeseries {
        self.timeseries(Metric::Bandwidth)
    }

    /// Distinct catalog values of `field` (JSON key name), ignoring the configuration.
    pub fn get_all_values(&self, field: &str) -> Result<BTreeSet<String>> {
        let field: CatalogField = field.parse().map_err(|e: String| anyhow!(e))?;
        Ok(self.catalog.all_values(field))
    }

    /// Catalog entries in `mapping_file` matching `filter`.
    pub fn get_tracelist(
        mapping_file: impl AsRef<Path>,
        filter: &TraceFilter,
    ) -> Result<Vec<MappingEntry>> {
        let catalog = MappingCatalog::load(mapping_file)?;
        Ok(catalog.lookup(filter).into_iter().cloned().collect())
    }

    pub fn cursor(&self, metric: Metric) -> &ReplayCursor {
        match metric {
            Metric::Rtt => &self.rtt,
            Metric::Bandwidth => &self.bandwidth,
        }
    }

    fn cursor_mut(&mut self, metric: Metric) -> &mut ReplayCursor {
        match metric {
            Metric::Rtt => &mut self.rtt,
            Metric::Bandwidth => &mut self.bandwidth,
        }
    }

    /// Always `Ready`: a failed instance is never constructed.
    pub fn status(&self) -> InstanceStatus {
        InstanceStatus::Ready
    }

    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    pub fn catalog(&self) -> &MappingCatalog {
        &self.catalog
    }

    /// Recording file backing `metric`.
    pub fn trace_file(&self, metric: Metric) -> &Path {
        match metric {
            Metric::Rtt => &self.rtt_file,
            Metric::Bandwidth => &self.bandwidth_file,
        }
    }

    /// Absolute time both metrics were aligned to at construction.
    pub fn anchor(&self) -> Nanos {
        self.anchor
    }
}

fn log_configuration(config: &InstanceConfig) {
    info!("NetworkTraceManager instance configuration:");
    for (key, value) in config.section() {
        info!("\t{} = {}", key, value);
    }
}

fn resolve_file(
    catalog: &MappingCatalog,
    metric: Metric,
    query: &TraceQuery,
    mapping_file: &Path,
) -> Result<PathBuf, InvalidConfiguration> {
    catalog.resolve_file(metric, query).ok_or_else(|| {
        warn!("No {} recording in {}", metric, mapping_file.display());
        InvalidConfiguration::wrong_input_file_path(format!(
            "no {} recording in {} matches the configuration",
            metric,
            mapping_file.display()
        ))
    })
}

fn load_recording(path: &Path) -> Result<Recording, InvalidConfiguration> {
    Recording::load(path).map_err(|e| {
        warn!("{:#}", e);
        InvalidConfiguration::wrong_input_file_path(format!("{:#}", e))
    })
}
