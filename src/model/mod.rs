//! Relay message model.
//!
//! # Data Flow
//! ```text
//! HTTP boundary
//!     → ClientRequest (request id + requesting origin assigned once)
//!     → tenant transport → connector
//!     → AcknowledgeRequest (back to the origin holding the acknowledge state)
//!     → TargetResponse (back to the requesting origin)
//! ```
//!
//! # Design Decisions
//! - One concrete shape per message kind, serialized as camelCase JSON
//! - Small bodies travel inline (base64); large bodies are referenced by size only
//! - Messages are immutable once dispatched

pub mod acknowledge;
pub mod body;
pub mod origin;
pub mod request;
pub mod response;

pub use acknowledge::AcknowledgeRequest;
pub use origin::{Origin, OriginId};
pub use request::{AcknowledgeMode, ClientRequest, HttpHeaders};
pub use response::TargetResponse;

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
