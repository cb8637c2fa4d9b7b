//! A live connector connection bound to its tenant.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::connector::ConnectionId;
use crate::coordination::AcknowledgeCoordinator;
use crate::model::{unix_millis, ClientRequest};
use crate::transport::{ConnectorTransport, TransportError};

/// Registration of one connector connection.
///
/// Also serves as the delivery target of the tenant handler bound to the
/// connection: requests received from the tenant's queue come through
/// [`ConnectorRegistration::deliver_request`].
pub struct ConnectorRegistration {
    connection_id: ConnectionId,
    tenant_name: String,
    remote_address: Option<SocketAddr>,
    transport: Arc<dyn ConnectorTransport>,
    acknowledges: Arc<AcknowledgeCoordinator>,
    registered_at: u64,
    disposed: AtomicBool,
}

impl ConnectorRegistration {
    pub fn new(
        connection_id: ConnectionId,
        tenant_name: impl Into<String>,
        remote_address: Option<SocketAddr>,
        transport: Arc<dyn ConnectorTransport>,
        acknowledges: Arc<AcknowledgeCoordinator>,
    ) -> Self {
        Self {
            connection_id,
            tenant_name: tenant_name.into(),
            remote_address,
            transport,
            acknowledges,
            registered_at: unix_millis(),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    pub fn tenant_name(&self) -> &str {
        &self.tenant_name
    }

    pub fn remote_address(&self) -> Option<SocketAddr> {
        self.remote_address
    }

    /// Unix millis.
    pub fn registered_at(&self) -> u64 {
        self.registered_at
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Register the acknowledge state if the request needs one, then send
    /// the request down the connection.
    pub async fn deliver_request(
        &self,
        request: ClientRequest,
        acknowledge_token: Option<String>,
    ) -> Result<(), TransportError> {
        if self.is_disposed() {
            tracing::warn!(
                connection_id = %self.connection_id,
                request_id = %request.request_id,
                "Request delivered to a disposed connection"
            );
            return Err(TransportError::ConnectionClosed(self.connection_id.to_string()));
        }

        if request.acknowledge_mode.requires_acknowledge() {
            self.acknowledges.register_request(
                request.request_id,
                self.connection_id.clone(),
                acknowledge_token,
                request.is_body_outsourced(),
            );
        }

        tracing::debug!(
            connection_id = %self.connection_id,
            request_id = %request.request_id,
            acknowledge_mode = ?request.acknowledge_mode,
            "Sending request to connector"
        );
        self.transport.transport_request(request).await
    }

    /// Send a request down the connection without acknowledge bookkeeping.
    pub async fn transport_request(&self, request: ClientRequest) -> Result<(), TransportError> {
        self.transport.transport_request(request).await
    }

    /// Release the connection's transport handle. Only the first call has an effect.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(connection_id = %self.connection_id, tenant = %self.tenant_name, "Disposing registration");
        self.transport.dispose().await;
    }
}

impl std::fmt::Debug for ConnectorRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistration")
            .field("connection_id", &self.connection_id)
            .field("tenant_name", &self.tenant_name)
            .field("remote_address", &self.remote_address)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
