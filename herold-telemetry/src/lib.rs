//! # Herold Telemetry
//!
//! Crate for logging and metrics around alert delivery.

pub mod logging;
pub mod metrics;

pub use logging::EventLogger;
pub use metrics::MetricsRecorder;
