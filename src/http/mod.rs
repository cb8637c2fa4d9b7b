//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Client HTTP call
//!     → relay.rs (tenant lookup, ClientRequest, body read)
//!     → RelayCore (dispatch, wait)
//!     → relay.rs (status, headers, inline or streamed body)
//!
//! Connector WebSocket
//!     → hub.rs (register; requests out; acknowledges and responses in)
//!
//! Connector body transfer
//!     → body.rs (fetch outsourced request bodies, upload response bodies)
//! ```

pub mod body;
pub mod hub;
pub mod relay;
pub mod server;

pub use hub::{ConnectorHub, HubMessage};
pub use server::{AppState, RelayServer, StartupError};

/// Header carrying the relay request id on responses.
pub const X_RELAY_REQUEST_ID: &str = "x-relay-request-id";
