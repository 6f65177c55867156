//! Network Trace Replay Library
//!
//! Exposes the replay engine for use by binaries and tests.

pub mod replay;

pub use replay::{InstanceStatus, InvalidConfiguration, Metric, NetworkTraceManager};
