//! Relay server library: transport routing and request/response correlation.

pub mod body_store;
pub mod config;
pub mod connector;
pub mod coordination;
pub mod dispatch;
pub mod http;
pub mod lifecycle;
pub mod model;
pub mod observability;
pub mod relay;
pub mod statistics;
pub mod subscription;
pub mod tenant;
pub mod transport;

pub use config::RelayConfig;
pub use http::RelayServer;
pub use lifecycle::Shutdown;
pub use relay::{RelayCore, TransportBackend};
