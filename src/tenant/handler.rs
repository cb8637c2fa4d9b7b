//! Tenant handler contract.

use async_trait::async_trait;
use std::sync::Arc;

use crate::connector::ConnectionId;
use crate::model::ClientRequest;
use crate::subscription::{Handler, Subscription};
use crate::transport::TransportError;

/// A request consumed from a tenant's queue.
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub request: ClientRequest,
    /// Transport-level token for confirming receipt. `None` when the
    /// transport already removed the message.
    pub acknowledge_token: Option<String>,
}

/// Consumes requests addressed to one tenant on behalf of one connection.
#[async_trait]
pub trait TenantHandler: Send + Sync {
    /// Observe consumed requests.
    fn subscribe(&self, handler: Handler<ReceivedRequest>) -> Subscription;

    /// Begin consuming. Called once, after the delivery target subscribed.
    async fn start(&self) -> Result<(), TransportError>;

    /// Confirm receipt of a message so the transport removes it.
    async fn acknowledge(&self, acknowledge_token: &str) -> Result<(), TransportError>;

    /// Stop consuming. Safe to call more than once.
    async fn dispose(&self);
}

/// Creates tenant handlers for new connections.
#[async_trait]
pub trait TenantHandlerFactory: Send + Sync {
    async fn create(
        &self,
        tenant_name: &str,
        connection_id: &ConnectionId,
    ) -> Result<Arc<dyn TenantHandler>, TransportError>;
}
