//! Single-instance transport.
//!
//! Requests go straight to the local connector registry; responses and
//! acknowledgements are handed to local subscribers. Suitable when only one
//! relay instance runs.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::connector::{ConnectionId, ConnectorRegistry};
use crate::model::{AcknowledgeRequest, ClientRequest, TargetResponse};
use crate::subscription::{Handler, Subscribers, Subscription};
use crate::tenant::{ReceivedRequest, TenantHandler, TenantHandlerFactory};
use crate::transport::{
    ConnectorTransport, ConnectorTransportFactory, ServerTransport, TenantTransport, TransportError,
};

/// Delivers requests to connectors registered on this instance.
pub struct InProcessTenantTransport {
    connectors: Arc<ConnectorRegistry>,
}

impl InProcessTenantTransport {
    pub fn new(connectors: Arc<ConnectorRegistry>) -> Self {
        Self { connectors }
    }
}

#[async_trait]
impl TenantTransport for InProcessTenantTransport {
    async fn transport(&self, request: ClientRequest) -> Result<(), TransportError> {
        let tenant = request.tenant_name.clone();
        if self.connectors.try_deliver_request(request).await? {
            Ok(())
        } else {
            Err(TransportError::NoConnector { tenant })
        }
    }
}

/// Hands responses and acknowledgements to local subscribers.
#[derive(Default)]
pub struct InProcessServerTransport {
    responses: Subscribers<TargetResponse>,
    acknowledges: Subscribers<AcknowledgeRequest>,
}

impl InProcessServerTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ServerTransport for InProcessServerTransport {
    async fn dispatch_response(&self, response: TargetResponse) -> Result<(), TransportError> {
        self.responses.notify(response).await;
        Ok(())
    }

    async fn dispatch_acknowledge(&self, request: AcknowledgeRequest) -> Result<(), TransportError> {
        self.acknowledges.notify(request).await;
        Ok(())
    }

    fn subscribe_responses(&self, handler: Handler<TargetResponse>) -> Subscription {
        self.responses.subscribe(handler)
    }

    fn subscribe_acknowledges(&self, handler: Handler<AcknowledgeRequest>) -> Subscription {
        self.acknowledges.subscribe(handler)
    }
}

/// Tenant handler for the in-process transport.
///
/// Requests reach connectors through the registry directly, so this handler
/// never emits requests and acknowledgements need no transport action.
pub struct InProcessTenantHandler {
    tenant_name: String,
    connection_id: ConnectionId,
    requests: Subscribers<ReceivedRequest>,
}

#[async_trait]
impl TenantHandler for InProcessTenantHandler {
    fn subscribe(&self, handler: Handler<ReceivedRequest>) -> Subscription {
        self.requests.subscribe(handler)
    }

    async fn start(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn acknowledge(&self, acknowledge_token: &str) -> Result<(), TransportError> {
        tracing::trace!(
            tenant = %self.tenant_name,
            connection_id = %self.connection_id,
            acknowledge_token = %acknowledge_token,
            "Acknowledged in process"
        );
        Ok(())
    }

    async fn dispose(&self) {}
}

#[derive(Debug, Default)]
pub struct InProcessTenantHandlerFactory;

#[async_trait]
impl TenantHandlerFactory for InProcessTenantHandlerFactory {
    async fn create(
        &self,
        tenant_name: &str,
        connection_id: &ConnectionId,
    ) -> Result<Arc<dyn TenantHandler>, TransportError> {
        Ok(Arc::new(InProcessTenantHandler {
            tenant_name: tenant_name.to_string(),
            connection_id: connection_id.clone(),
            requests: Subscribers::new(),
        }))
    }
}

/// Connector transports backed by in-memory channels, for connectors living
/// in the same process.
///
/// Call [`InProcessConnectorTransports::attach`] before registering the
/// connection to receive its requests.
#[derive(Default)]
pub struct InProcessConnectorTransports {
    senders: DashMap<ConnectionId, mpsc::UnboundedSender<ClientRequest>>,
}

impl InProcessConnectorTransports {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the request channel of a connection.
    pub fn attach(&self, connection_id: &ConnectionId) -> mpsc::UnboundedReceiver<ClientRequest> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.senders.insert(connection_id.clone(), sender);
        receiver
    }
}

impl ConnectorTransportFactory for InProcessConnectorTransports {
    fn create(&self, connection_id: &ConnectionId) -> Arc<dyn ConnectorTransport> {
        let sender = self.senders.get(connection_id).map(|s| s.value().clone());
        if sender.is_none() {
            tracing::warn!(connection_id = %connection_id, "No channel attached for connection");
        }
        Arc::new(ChannelConnectorTransport {
            connection_id: connection_id.clone(),
            sender: Mutex::new(sender),
        })
    }
}

struct ChannelConnectorTransport {
    connection_id: ConnectionId,
    sender: Mutex<Option<mpsc::UnboundedSender<ClientRequest>>>,
}

#[async_trait]
impl ConnectorTransport for ChannelConnectorTransport {
    async fn transport_request(&self, request: ClientRequest) -> Result<(), TransportError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        match sender {
            Some(sender) => sender
                .send(request)
                .map_err(|_| TransportError::ConnectionClosed(self.connection_id.to_string())),
            None => Err(TransportError::ConnectionClosed(self.connection_id.to_string())),
        }
    }

    async fn dispose(&self) {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OriginId;
    use crate::subscription::handler;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_server_transport_notifies_subscribers() {
        let transport = InProcessServerTransport::new();
        let received = Arc::new(AtomicUsize::new(0));
        let counter = received.clone();
        let _subscription = transport.subscribe_responses(handler(move |_: TargetResponse| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        let request = ClientRequest::new("acme", "api", OriginId::new());
        transport
            .dispatch_response(TargetResponse::for_request(&request, 200))
            .await
            .unwrap();

        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disposed_channel_transport_rejects_requests() {
        let transports = InProcessConnectorTransports::new();
        let connection_id = ConnectionId::new();
        let _receiver = transports.attach(&connection_id);
        let transport = transports.create(&connection_id);

        transport.dispose().await;
        transport.dispose().await;

        let request = ClientRequest::new("acme", "api", OriginId::new());
        assert!(matches!(
            transport.transport_request(request).await,
            Err(TransportError::ConnectionClosed(_))
        ));
    }
}
