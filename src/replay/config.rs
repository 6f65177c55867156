//! Replay Instance Configuration
//!
//! Configuration arrives as a flat key/value section. Sections can be built in
//! code or read from a TOML file where each top-level table is one section:
//!
//! ```toml
//! [DEFAULT]
//! max_tracegap_seconds = 30
//! mapping_file = "inputFiles/mapping.json"
//!
//! [conf1]
//! seed = 0
//! typeofmeasure = "active"
//! protocol = "TCP"
//! observerPos = "edge"
//! cross-traffic = "0M"
//! access-technology = "wifi"
//! sender-identity = "Observer"
//! receiver-identity = "Client"
//! trace = true
//! ```
//!
//! Keys in `[DEFAULT]` apply to every section that does not set them.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};

use super::catalog::{Direction, TraceQuery};
use super::clock::{parse_recording_timestamp, Nanos, NANOS_PER_SEC};

/// Flat configuration section, keys as written by the user.
pub type ConfigSection = BTreeMap<String, String>;

/// Name of the section whose keys are inherited by every other section.
pub const DEFAULT_SECTION: &str = "DEFAULT";

/// Catalog used when `mapping_file` is not set.
pub const DEFAULT_MAPPING_FILE: &str = "inputFiles/mapping.json";

/// Seed keys, in order of precedence.
pub const SEED_KEYS: [&str; 3] = ["seed", "startingitemseed", "traceseed"];

/// Keys that must be present when `typeofmeasure` is `active`.
pub const ACTIVE_REQUIRED_KEYS: [&str; 7] = [
    "protocol",
    "observerPos",
    "cross-traffic",
    "access-technology",
    "sender-identity",
    "receiver-identity",
    "trace",
];

/// A TOML configuration file holding named sections.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    defaults: ConfigSection,
    sections: BTreeMap<String, ConfigSection>,
}

impl ConfigFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let table: toml::Table = content.parse()?;
        let mut file = Self::default();

        for (name, value) in table {
            let toml::Value::Table(section) = value else {
                bail!("top-level key '{}' must belong to a section", name);
            };
            let mut flat = ConfigSection::new();
            for (key, value) in section {
                let value = scalar_to_string(&value)
                    .ok_or_else(|| anyhow!("[{}] {}: expected a scalar value", name, key))?;
                flat.insert(key, value);
            }
            if name == DEFAULT_SECTION {
                file.defaults = flat;
            } else {
                file.sections.insert(name, flat);
            }
        }

        Ok(file)
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// A section merged over the defaults.
    pub fn section(&self, name: &str) -> Result<ConfigSection> {
        let own = self
            .sections
            .get(name)
            .ok_or_else(|| anyhow!("no section named '{}'", name))?;
        let mut merged = self.defaults.clone();
        merged.extend(own.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(merged)
    }
}

fn scalar_to_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Datetime(d) => Some(d.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => None,
    }
}

/// Why a section could not be turned into an [`InstanceConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Malformed {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(key) => write!(f, "{} is missing", key),
            Self::Malformed {
                key,
                value,
                expected,
            } => write!(f, "{} = '{}' is not {}", key, value, expected),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Validated configuration of one replay instance.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceConfig {
    pub mapping_file: PathBuf,
    pub max_tracegap_seconds: u64,
    pub seed: u64,
    pub typeofmeasure: String,
    pub protocol: Option<String>,
    pub observer_pos: Option<String>,
    pub cross_traffic: Option<String>,
    pub access_technology: Option<String>,
    pub sender_identity: Option<String>,
    pub receiver_identity: Option<String>,
    pub direction: Option<Direction>,
    pub trace: Option<bool>,
    /// Fixed start time replacing the random start of the first metric.
    pub start_time: Option<Nanos>,
    section: ConfigSection,
}

impl InstanceConfig {
    pub fn from_section(section: &ConfigSection) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            section
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let (seed_key, seed_raw) = SEED_KEYS
            .iter()
            .copied()
            .find_map(|key| get(key).map(|v| (key, v)))
            .ok_or(ConfigError::Missing("seed"))?;
        let seed = parse_seed(&seed_raw).ok_or_else(|| ConfigError::Malformed {
            key: seed_key,
            value: seed_raw.clone(),
            expected: "an integer",
        })?;

        let typeofmeasure = get("typeofmeasure").ok_or(ConfigError::Missing("typeofmeasure"))?;
        if typeofmeasure == "active" {
            if let Some(key) = ACTIVE_REQUIRED_KEYS
                .iter()
                .copied()
                .find(|&key| get(key).is_none())
            {
                return Err(ConfigError::Missing(key));
            }
        }

        let max_tracegap_raw =
            get("max_tracegap_seconds").ok_or(ConfigError::Missing("max_tracegap_seconds"))?;
        let max_tracegap_seconds = max_tracegap_raw
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs <= (i64::MAX / NANOS_PER_SEC) as u64)
            .ok_or_else(|| ConfigError::Malformed {
                key: "max_tracegap_seconds",
                value: max_tracegap_raw.clone(),
                expected: "a non-negative integer number of seconds",
            })?;

        let trace = match get("trace") {
            Some(raw) => Some(parse_bool(&raw).ok_or(ConfigError::Malformed {
                key: "trace",
                value: raw,
                expected: "a boolean",
            })?),
            None => None,
        };

        let direction = match get("direction") {
            Some(raw) => Some(raw.parse::<Direction>().map_err(|_| ConfigError::Malformed {
                key: "direction",
                value: raw,
                expected: "upstream or downstream",
            })?),
            None => None,
        };

        let start_time = match get("start_time") {
            Some(raw) => Some(parse_recording_timestamp(&raw).ok_or(ConfigError::Malformed {
                key: "start_time",
                value: raw,
                expected: "a timestamp like 2020-01-24 15:36:55.000000",
            })?),
            None => None,
        };

        Ok(Self {
            mapping_file: get("mapping_file")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MAPPING_FILE)),
            max_tracegap_seconds,
            seed,
            typeofmeasure,
            protocol: get("protocol"),
            observer_pos: get("observerPos"),
            cross_traffic: get("cross-traffic"),
            access_technology: get("access-technology"),
            sender_identity: get("sender-identity"),
            receiver_identity: get("receiver-identity"),
            direction,
            trace,
            start_time,
            section: section.clone(),
        })
    }

    /// Maximum gap between consecutive samples after compaction.
    pub fn max_tracegap(&self) -> Nanos {
        self.max_tracegap_seconds as Nanos * NANOS_PER_SEC
    }

    /// The section this configuration was validated from.
    pub fn section(&self) -> &ConfigSection {
        &self.section
    }

    /// Catalog query describing the configured experiment.
    pub fn trace_query(&self) -> TraceQuery {
        TraceQuery {
            typeofmeasure: self.typeofmeasure.clone(),
            protocol: self.protocol.clone(),
            observer_pos: self.observer_pos.clone(),
            noise: self.cross_traffic.clone(),
            access_technology: self.access_technology.clone(),
            sender_identity: self.sender_identity.clone(),
            receiver_identity: self.receiver_identity.clone(),
        }
    }

    /// Leg implied by sender/receiver when it disagrees with `direction`.
    pub fn conflicting_leg(&self) -> Option<Direction> {
        let configured = self.direction?;
        let leg = Direction::of_leg(self.sender_identity.as_deref()?, self.receiver_identity.as_deref()?)?;
        (leg != configured).then_some(leg)
    }
}

fn parse_seed(raw: &str) -> Option<u64> {
    raw.parse::<u64>()
        .ok()
        .or_else(|| raw.parse::<i64>().ok().map(|s| s as u64))
}

/// Booleans as accepted by INI-style configs.
fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Some(true),
        "0" | "no" | "false" | "off" => Some(false),
        _ => None,
    }
}
