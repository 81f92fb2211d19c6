//! # herold-engine
//!
//! The alert dispatch engine: routes alerts to channels, serializes delivery
//! per channel, and applies batching, rate limiting, retries with backoff,
//! escalation and health tracking.
//!
//! ### Key Submodules:
//! - `engine`: the `AlertDispatchEngine` facade
//! - `backend`: the `DeliveryBackend` trait and the built-in log/console backends
//! - `health`: per-channel health and the system rollup
//! - `sink`: where lifecycle events are published
//! - `format`: message templating
//!
//! Each channel is owned by a single worker task; the facade never touches a
//! channel's limiter, batch or timers directly.

pub mod backend;
pub mod engine;
pub mod error;
pub mod format;
pub mod health;
pub mod sink;
pub mod stats;

mod shared;
mod worker;

pub use backend::{BackendRegistry, ConsoleBackend, DeliveryBackend, DeliveryRequest, LogBackend};
pub use engine::{AlertDispatchEngine, DispatchReport};
pub use error::{DeliveryError, DeliveryErrorKind, DispatchError};
pub use health::{ChannelHealthState, ChannelHealthTracker, HealthSnapshot, HealthUpdate};
pub use sink::{BroadcastSink, EventSink, FanoutSink, MemorySink, NullSink, TracingSink};
pub use stats::{ChannelStatistics, ChannelStatisticsSnapshot};
