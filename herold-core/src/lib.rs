//! # herold-core
//!
//! Domain values shared by every Herold crate: alert severities, the alert
//! record itself, channel kinds and the events the dispatch engine publishes.
//!
//! ### Key Submodules:
//! - `alert`: the `Alert` record and its acknowledgement/resolution lifecycle
//! - `severity`: ordered severity scale used by channel filters
//! - `events`: immutable event payloads with byte-capped string fields
//! - `text`: UTF-8 safe truncation helpers
//!
//! Nothing in this crate performs I/O or spawns tasks.

pub mod alert;
pub mod channel;
pub mod error;
pub mod events;
pub mod severity;
pub mod text;

pub mod prelude {
    pub use crate::alert::*;
    pub use crate::channel::*;
    pub use crate::error::*;
    pub use crate::events::*;
    pub use crate::severity::*;
}

pub use alert::Alert;
pub use channel::ChannelType;
pub use error::CoreError;
pub use severity::Severity;
