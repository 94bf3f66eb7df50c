//! # Telemetry Module
//!
//! Turns the decoded frame stream into the values a host displays.
//!
//! This module handles:
//! - Merging frames into the immutable [`SensorData`] snapshot
//! - Keeping a bounded, newest-first log of events and commands
//! - Measuring the inbound stream rate
//! - Command helpers that only send while the link is live

pub mod engine;
pub mod log_ring;
pub mod snapshot;
pub mod stats;

pub use engine::TelemetryEngine;
pub use log_ring::{LogEntry, LogRing};
pub use snapshot::SensorData;
pub use stats::StreamStats;
