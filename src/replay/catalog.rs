//! Mapping Catalog
//!
//! JSON index of every recorded run. Two kinds of question are answered here:
//!
//! - [`MappingCatalog::lookup`]: every run matching a [`TraceFilter`] (unset
//!   filter fields are unconstrained).
//! - [`MappingCatalog::resolve`]: the first run, in catalog order, that backs a
//!   given metric for an experiment described by a [`TraceQuery`].

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::sample::Metric;

/// Traffic direction of a bandwidth run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upstream,
    Downstream,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upstream => "upstream",
            Self::Downstream => "downstream",
        }
    }

    /// Physical leg implied by a sender/receiver pair.
    ///
    /// Traffic from the client towards the server side is upstream, the reverse
    /// is downstream. Pairs outside the Client/Observer/Server topology have no
    /// defined leg.
    pub fn of_leg(sender: &str, receiver: &str) -> Option<Self> {
        match (sender, receiver) {
            ("Client", "Observer") | ("Observer", "Server") => Some(Self::Upstream),
            ("Observer", "Client") | ("Server", "Observer") => Some(Self::Downstream),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "upstream" => Ok(Self::Upstream),
            "downstream" => Ok(Self::Downstream),
            other => Err(format!(
                "unknown direction '{}' (expected upstream or downstream)",
                other
            )),
        }
    }
}

/// One recorded run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub typeofmeasure: String,
    /// Protocol + metric, e.g. `TCPBandwidth` or `UDPRTT`.
    pub command: String,
    #[serde(default, deserialize_with = "lenient_direction")]
    pub direction: Option<Direction>,
    #[serde(rename = "ObserverPos")]
    pub observer_pos: String,
    /// Cross-traffic level, e.g. `"10M"`.
    pub noise: String,
    #[serde(rename = "access-technology")]
    pub access_technology: String,
    #[serde(rename = "senderIdentity", default, skip_serializing_if = "Option::is_none")]
    pub sender_identity: Option<String>,
    #[serde(rename = "receiverIdentity", default, skip_serializing_if = "Option::is_none")]
    pub receiver_identity: Option<String>,
    #[serde(rename = "first-endpoint", default, skip_serializing_if = "Option::is_none")]
    pub first_endpoint: Option<String>,
    #[serde(rename = "second-endpoint", default, skip_serializing_if = "Option::is_none")]
    pub second_endpoint: Option<String>,
    /// Recording file. Empty when the catalog row carries no usable path.
    #[serde(default, deserialize_with = "lenient_path")]
    pub path: String,
    #[serde(
        default,
        alias = "firstTimestamp",
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub first_timestamp: Option<String>,
    #[serde(
        default,
        alias = "lastTimestamp",
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_timestamp: Option<String>,
}

/// A string, or the first element of a list of strings. Anything else is `None`.
fn first_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Array(items) => items.into_iter().next().and_then(first_string),
        _ => None,
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(first_string(Value::deserialize(d)?))
}

fn lenient_path<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(first_string(Value::deserialize(d)?).unwrap_or_default())
}

fn lenient_direction<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Direction>, D::Error> {
    Ok(first_string(Value::deserialize(d)?).and_then(|raw| match raw.parse() {
        Ok(direction) => Some(direction),
        Err(e) => {
            warn!("Ignoring catalog direction: {}", e);
            None
        }
    }))
}

impl MappingEntry {
    pub fn is_rtt(&self) -> bool {
        self.command.contains("RTT")
    }

    pub fn is_bandwidth(&self) -> bool {
        self.command.contains("Bandwidth")
    }

    /// Value of a catalog field, `None` when the entry does not carry it.
    pub fn field(&self, field: CatalogField) -> Option<&str> {
        match field {
            CatalogField::TypeOfMeasure => Some(&self.typeofmeasure),
            CatalogField::Command => Some(&self.command),
            CatalogField::Direction => self.direction.as_ref().map(Direction::as_str),
            CatalogField::ObserverPos => Some(&self.observer_pos),
            CatalogField::Noise => Some(&self.noise),
            CatalogField::AccessTechnology => Some(&self.access_technology),
            CatalogField::SenderIdentity => self.sender_identity.as_deref(),
            CatalogField::ReceiverIdentity => self.receiver_identity.as_deref(),
            CatalogField::FirstEndpoint => self.first_endpoint.as_deref(),
            CatalogField::SecondEndpoint => self.second_endpoint.as_deref(),
            CatalogField::Path => Some(&self.path),
        }
    }

    /// One-line summary of the run configuration.
    pub fn describe(&self) -> String {
        let mut parts = vec![
            format!("typeofmeasure: {}", self.typeofmeasure),
            format!("command: {}", self.command),
            format!("ObserverPos: {}", self.observer_pos),
            format!("noise: {}", self.noise),
        ];
        if self.is_bandwidth() {
            if let Some(direction) = self.direction {
                parts.push(format!("direction: {}", direction));
            }
            push_opt(&mut parts, "senderIdentity", &self.sender_identity);
            push_opt(&mut parts, "receiverIdentity", &self.receiver_identity);
        } else {
            push_opt(&mut parts, "first-endpoint", &self.first_endpoint);
            push_opt(&mut parts, "second-endpoint", &self.second_endpoint);
        }
        parts.push(format!("access-technology: {}", self.access_technology));
        parts.join(", ")
    }
}

fn push_opt(parts: &mut Vec<String>, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        parts.push(format!("{}: {}", key, value));
    }
}

/// Catalog field names, as spelled in the JSON file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogField {
    TypeOfMeasure,
    Command,
    Direction,
    ObserverPos,
    Noise,
    AccessTechnology,
    SenderIdentity,
    ReceiverIdentity,
    FirstEndpoint,
    SecondEndpoint,
    Path,
}

impl CatalogField {
    pub const ALL: [CatalogField; 11] = [
        Self::TypeOfMeasure,
        Self::Command,
        Self::Direction,
        Self::ObserverPos,
        Self::Noise,
        Self::AccessTechnology,
        Self::SenderIdentity,
        Self::ReceiverIdentity,
        Self::FirstEndpoint,
        Self::SecondEndpoint,
        Self::Path,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::TypeOfMeasure => "typeofmeasure",
            Self::Command => "command",
            Self::Direction => "direction",
            Self::ObserverPos => "ObserverPos",
            Self::Noise => "noise",
            Self::AccessTechnology => "access-technology",
            Self::SenderIdentity => "senderIdentity",
            Self::ReceiverIdentity => "receiverIdentity",
            Self::FirstEndpoint => "first-endpoint",
            Self::SecondEndpoint => "second-endpoint",
            Self::Path => "path",
        }
    }
}

impl FromStr for CatalogField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.key() == s.trim())
            .ok_or_else(|| {
                let keys: Vec<&str> = Self::ALL.iter().map(|f| f.key()).collect();
                format!("unknown catalog field '{}' (expected one of {})", s, keys.join(", "))
            })
    }
}

/// Unset fields are unconstrained; a set field must equal the entry's value
/// whenever the entry carries that field.
fn field_matches(filter: &Option<String>, value: Option<&str>) -> bool {
    match (filter, value) {
        (Some(wanted), Some(actual)) => wanted == actual,
        _ => true,
    }
}

/// Filter for listing runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceFilter {
    pub typeofmeasure: Option<String>,
    pub command: Option<String>,
    pub direction: Option<Direction>,
    pub observer_pos: Option<String>,
    pub noise: Option<String>,
    pub access_technology: Option<String>,
    pub sender_identity: Option<String>,
    pub receiver_identity: Option<String>,
    pub first_endpoint: Option<String>,
    pub second_endpoint: Option<String>,
}

impl TraceFilter {
    pub fn typeofmeasure(mut self, v: impl Into<String>) -> Self {
        self.typeofmeasure = Some(v.into());
        self
    }

    pub fn command(mut self, v: impl Into<String>) -> Self {
        self.command = Some(v.into());
        self
    }

    pub fn direction(mut self, v: Direction) -> Self {
        self.direction = Some(v);
        self
    }

    pub fn observer_pos(mut self, v: impl Into<String>) -> Self {
        self.observer_pos = Some(v.into());
        self
    }

    pub fn noise(mut self, v: impl Into<String>) -> Self {
        self.noise = Some(v.into());
        self
    }

    pub fn access_technology(mut self, v: impl Into<String>) -> Self {
        self.access_technology = Some(v.into());
        self
    }

    pub fn sender_identity(mut self, v: impl Into<String>) -> Self {
        self.sender_identity = Some(v.into());
        self
    }

    pub fn receiver_identity(mut self, v: impl Into<String>) -> Self {
        self.receiver_identity = Some(v.into());
        self
    }

    pub fn first_endpoint(mut self, v: impl Into<String>) -> Self {
        self.first_endpoint = Some(v.into());
        self
    }

    pub fn second_endpoint(mut self, v: impl Into<String>) -> Self {
        self.second_endpoint = Some(v.into());
        self
    }

    pub fn matches(&self, entry: &MappingEntry) -> bool {
        // RTT runs are direction-agnostic; a direction on one is a cataloging error.
        if entry.is_rtt() && entry.direction.is_some() {
            return false;
        }
        if let Some(direction) = self.direction {
            if entry.direction != Some(direction) {
                return false;
            }
        }

        field_matches(&self.typeofmeasure, Some(&entry.typeofmeasure))
            && field_matches(&self.command, Some(&entry.command))
            && field_matches(&self.observer_pos, Some(&entry.observer_pos))
            && field_matches(&self.noise, Some(&entry.noise))
            && field_matches(&self.access_technology, Some(&entry.access_technology))
            && field_matches(&self.sender_identity, entry.sender_identity.as_deref())
            && field_matches(&self.receiver_identity, entry.receiver_identity.as_deref())
            && field_matches(&self.first_endpoint, entry.first_endpoint.as_deref())
            && field_matches(&self.second_endpoint, entry.second_endpoint.as_deref())
    }
}

/// Experiment description used to pick the recording backing a metric.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceQuery {
    pub typeofmeasure: String,
    pub protocol: Option<String>,
    pub observer_pos: Option<String>,
    pub noise: Option<String>,
    pub access_technology: Option<String>,
    pub sender_identity: Option<String>,
    pub receiver_identity: Option<String>,
}

impl TraceQuery {
    /// Catalog command for `metric`, when the protocol is known.
    pub fn command(&self, metric: Metric) -> Option<String> {
        self.protocol
            .as_ref()
            .map(|p| format!("{}{}", p, metric.command_suffix()))
    }

    pub fn matches(&self, metric: Metric, entry: &MappingEntry) -> bool {
        let command_ok = match self.command(metric) {
            Some(command) => entry.command == command,
            None => entry.command.ends_with(metric.command_suffix()),
        };
        if !command_ok
            || entry.typeofmeasure != self.typeofmeasure
            || !field_matches(&self.observer_pos, Some(&entry.observer_pos))
            || !field_matches(&self.noise, Some(&entry.noise))
            || !field_matches(&self.access_technology, Some(&entry.access_technology))
        {
            return false;
        }

        // Bandwidth identities: exact match
        if !field_matches(&self.sender_identity, entry.sender_identity.as_deref())
            || !field_matches(&self.receiver_identity, entry.receiver_identity.as_deref())
        {
            return false;
        }

        if self.contradicts_direction(entry) {
            return false;
        }

        // RTT identities: the first endpoint is one of the two parties
        match entry.first_endpoint.as_deref() {
            Some(endpoint) => {
                let parties = [&self.sender_identity, &self.receiver_identity];
                parties.iter().all(|p| p.is_none())
                    || parties.iter().any(|p| p.as_deref() == Some(endpoint))
            }
            None => true,
        }
    }

    /// True if the entry's direction label disagrees with the physical leg
    /// implied by the requested sender and receiver. Entries without a
    /// direction are never excluded by this rule.
    fn contradicts_direction(&self, entry: &MappingEntry) -> bool {
        let (Some(labelled), Some(sender), Some(receiver)) = (
            entry.direction,
            self.sender_identity.as_deref(),
            self.receiver_identity.as_deref(),
        ) else {
            return false;
        };
        matches!(Direction::of_leg(sender, receiver), Some(leg) if leg != labelled)
    }
}

/// Loaded mapping catalog.
#[derive(Debug, Clone)]
pub struct MappingCatalog {
    source: Option<PathBuf>,
    entries: Vec<MappingEntry>,
}

impl MappingCatalog {
    /// Load and parse a catalog file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read mapping catalog {}", path.display()))?;
        let mut entries: Vec<MappingEntry> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse mapping catalog {}", path.display()))?;

        entries.retain(|entry| {
            let usable = !entry.path.trim().is_empty();
            if !usable {
                warn!("Skipping catalog entry without a recording path: {}", entry.describe());
            }
            usable
        });

        info!("Loaded {} catalog entries from {}", entries.len(), path.display());

        Ok(Self {
            source: Some(path.to_path_buf()),
            entries,
        })
    }

    /// Build from in-memory entries (relative paths resolve against the cwd only).
    pub fn from_entries(entries: Vec<MappingEntry>) -> Self {
        Self {
            source: None,
            entries,
        }
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every entry matching `filter`, in catalog order.
    pub fn lookup(&self, filter: &TraceFilter) -> Vec<&MappingEntry> {
        self.entries.iter().filter(|e| filter.matches(e)).collect()
    }

    /// First entry backing `metric` for `query`.
    pub fn resolve(&self, metric: Metric, query: &TraceQuery) -> Option<&MappingEntry> {
        let found = self.entries.iter().find(|e| query.matches(metric, e));
        match found {
            Some(entry) => debug!("Resolved {} run: {}", metric, entry.describe()),
            None => debug!("No {} run matches {:?}", metric, query),
        }
        found
    }

    /// Recording file backing `metric` for `query`.
    pub fn resolve_file(&self, metric: Metric, query: &TraceQuery) -> Option<PathBuf> {
        self.resolve(metric, query).map(|e| self.recording_path(e))
    }

    /// Locate an entry's recording: as given (relative to the cwd) if it exists,
    /// otherwise relative to the catalog file's directory.
    pub fn recording_path(&self, entry: &MappingEntry) -> PathBuf {
        let direct = PathBuf::from(&entry.path);
        if direct.is_absolute() || direct.exists() {
            return direct;
        }
        self.source
            .as_ref()
            .and_then(|src| src.parent())
            .map(|dir| dir.join(&direct))
            .filter(|candidate| candidate.exists())
            .unwrap_or(direct)
    }

    /// Distinct values of a field across the whole catalog.
    pub fn all_values(&self, field: CatalogField) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter_map(|e| e.field(field))
            .map(str::to_string)
            .collect()
    }
}
