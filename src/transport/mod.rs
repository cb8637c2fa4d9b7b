//! Transport contracts and adapters.
//!
//! # Data Flow
//! ```text
//! RequestCoordinator
//!     → TenantTransport (addressed by tenant)
//!         in_process: ConnectorRegistry::try_deliver_request
//!         broker:     "Requests <tenant>" → TenantHandler on the hosting instance
//!     → ConnectorTransport (one per live connection)
//!
//! Response / Acknowledge dispatchers
//!     → ServerTransport (addressed by origin id)
//!         in_process: subscribers invoked directly
//!         broker:     "Responses <origin>" / "Acknowledges <origin>"
//! ```
//!
//! # Design Decisions
//! - Coordination code depends only on these traits
//! - Publish failures surface as `TransportError` and are never retried here
//! - Disposal of transport handles is idempotent

pub mod broker;
pub mod in_process;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::connector::ConnectionId;
use crate::model::{AcknowledgeRequest, ClientRequest, TargetResponse};
use crate::subscription::{Handler, Subscription};

/// Errors raised while moving messages between instances and connectors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No connector is currently registered for the tenant.
    #[error("no connector registered for tenant {tenant}")]
    NoConnector { tenant: String },

    /// The message could not be handed to the transport.
    #[error("failed to publish to {address}: {reason}")]
    Publish { address: String, reason: String },

    /// Consuming from the transport could not start.
    #[error("failed to consume from {address}: {reason}")]
    Consume { address: String, reason: String },

    /// The transport refused the acknowledgement.
    #[error("failed to acknowledge: {0}")]
    Acknowledge(String),

    /// The connector connection is gone.
    #[error("connection {0} is closed")]
    ConnectionClosed(String),

    /// A message could not be encoded or decoded.
    #[error("message serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Delivers a request to whichever instance hosts a connector for its tenant.
#[async_trait]
pub trait TenantTransport: Send + Sync {
    async fn transport(&self, request: ClientRequest) -> Result<(), TransportError>;
}

/// Delivers responses and acknowledgements to a specific origin instance.
#[async_trait]
pub trait ServerTransport: Send + Sync {
    async fn dispatch_response(&self, response: TargetResponse) -> Result<(), TransportError>;

    async fn dispatch_acknowledge(&self, request: AcknowledgeRequest) -> Result<(), TransportError>;

    /// Observe responses addressed to the local origin.
    fn subscribe_responses(&self, handler: Handler<TargetResponse>) -> Subscription;

    /// Observe acknowledgements addressed to the local origin.
    fn subscribe_acknowledges(&self, handler: Handler<AcknowledgeRequest>) -> Subscription;
}

/// Sends requests down one connector connection.
#[async_trait]
pub trait ConnectorTransport: Send + Sync {
    async fn transport_request(&self, request: ClientRequest) -> Result<(), TransportError>;

    /// Release the connection handle. Safe to call more than once.
    async fn dispose(&self);
}

/// Creates the transport handle for a newly registered connection.
pub trait ConnectorTransportFactory: Send + Sync {
    fn create(&self, connection_id: &ConnectionId) -> Arc<dyn ConnectorTransport>;
}
