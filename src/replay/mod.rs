//! Network Trace Replay
//!
//! Replays recorded RTT and bandwidth measurements as if they were live,
//! indefinitely and deterministically per seed.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    NetworkTraceManager                        │
//! │  (validated InstanceConfig, owns one cursor per metric)       │
//! └──────────────────────────────────────────────────────────────┘
//!        │                         │
//!        ▼                         ▼
//! ┌─────────────┐          ┌─────────────┐
//! │ Mapping     │  paths   │ Recording   │
//! │ Catalog     │─────────▶│ (file)      │
//! └─────────────┘          └──────┬──────┘
//!                                 ▼
//!                          ┌─────────────┐   anchor   ┌─────────────┐
//!                          │ Loader (RTT)│───────────▶│ Loader (BW) │
//!                          └──────┬──────┘            └──────┬──────┘
//!                                 └────────────┬─────────────┘
//!                                              ▼
//!                                       ┌─────────────┐
//!                                       │  Compact    │
//!                                       └──────┬──────┘
//!                              ┌───────────────┴───────────────┐
//!                              ▼                               ▼
//!                       ┌─────────────┐                 ┌─────────────┐
//!                       │ReplayCursor │                 │ Timeseries  │
//!                       │ (advance)   │                 │ (extract)   │
//!                       └─────────────┘                 └─────────────┘
//! ```
//!
//! # Determinism
//!
//! - **RNG**: one `ChaCha8Rng` per instance, seeded from the configuration
//! - **Clock**: playback time only moves through `advance`; no system time
//! - **Timestamps**: playback timestamps never decrease, across any number of loops

pub mod catalog;
pub mod clock;
pub mod compact;
pub mod config;
pub mod cursor;
pub mod loader;
pub mod manager;
pub mod recording;
pub mod sample;
pub mod timeseries;

pub use catalog::{
    CatalogField, Direction, MappingCatalog, MappingEntry, TraceFilter, TraceQuery,
};
pub use clock::{Nanos, PlaybackClock, NANOS_PER_MILLI, NANOS_PER_SEC};
pub use compact::{compact, CompactionStats};
pub use config::{ConfigError, ConfigFile, ConfigSection, InstanceConfig};
pub use cursor::{CursorError, ReplayCursor, ReplaySample};
pub use loader::{LoadedTrace, StartPosition};
pub use manager::{InstanceStatus, InvalidConfiguration, NetworkTraceManager};
pub use recording::{RecordedSample, Recording};
pub use sample::{Metric, TraceSample, TraceSequence};
pub use timeseries::{histogram, Histogram, Timeseries};
