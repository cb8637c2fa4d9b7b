//! Binds tenant handlers to connector registrations.

use dashmap::DashMap;
use std::sync::Arc;

use crate::connector::{ConnectionId, ConnectorRegistration};
use crate::subscription::{handler, Subscription};
use crate::tenant::{ReceivedRequest, TenantHandler, TenantHandlerFactory};
use crate::transport::TransportError;

/// A tenant handler, its subscription and the registration it feeds.
pub struct TenantBinding {
    handler: Arc<dyn TenantHandler>,
    subscription: Subscription,
    registration: Arc<ConnectorRegistration>,
}

impl TenantBinding {
    /// Stop the flow of requests, then release the handler and the registration.
    pub async fn dispose(mut self) {
        self.subscription.unsubscribe();
        self.handler.dispose().await;
        self.registration.dispose().await;
    }
}

/// Tracks one tenant handler per connection.
pub struct TenantHandlerRegistry {
    factory: Arc<dyn TenantHandlerFactory>,
    bindings: DashMap<ConnectionId, TenantBinding>,
}

impl TenantHandlerRegistry {
    pub fn new(factory: Arc<dyn TenantHandlerFactory>) -> Self {
        Self {
            factory,
            bindings: DashMap::new(),
        }
    }

    /// Create and start a handler for the connection, forwarding its requests
    /// to the registration.
    ///
    /// Returns the binding this one replaced; the caller disposes it.
    pub async fn bind(
        &self,
        tenant_name: &str,
        connection_id: &ConnectionId,
        registration: Arc<ConnectorRegistration>,
    ) -> Result<Option<TenantBinding>, TransportError> {
        let tenant_handler = self.factory.create(tenant_name, connection_id).await?;

        let target = registration.clone();
        let subscription = tenant_handler.subscribe(handler(move |received: ReceivedRequest| {
            let target = target.clone();
            async move {
                let request_id = received.request.request_id;
                if let Err(e) = target
                    .deliver_request(received.request, received.acknowledge_token)
                    .await
                {
                    tracing::warn!(
                        connection_id = %target.connection_id(),
                        request_id = %request_id,
                        error = %e,
                        "Failed to deliver request to connector"
                    );
                }
            }
        }));

        let binding = TenantBinding {
            handler: tenant_handler.clone(),
            subscription,
            registration,
        };
        // Bound before consuming starts so an early acknowledge finds the handler.
        let replaced = self.bindings.insert(connection_id.clone(), binding);

        if let Err(e) = tenant_handler.start().await {
            if let Some(binding) = self.unbind(connection_id) {
                binding.dispose().await;
            }
            if let Some(binding) = replaced {
                binding.dispose().await;
            }
            return Err(e);
        }

        tracing::debug!(connection_id = %connection_id, tenant = %tenant_name, "Tenant handler bound");
        Ok(replaced)
    }

    /// Remove the binding of a connection without disposing it.
    pub fn unbind(&self, connection_id: &ConnectionId) -> Option<TenantBinding> {
        self.bindings.remove(connection_id).map(|(_, binding)| binding)
    }

    /// Confirm receipt through the connection's handler.
    ///
    /// Returns `false` when the connection has no handler.
    pub async fn acknowledge(
        &self,
        connection_id: &ConnectionId,
        acknowledge_token: &str,
    ) -> Result<bool, TransportError> {
        let tenant_handler = self
            .bindings
            .get(connection_id)
            .map(|binding| binding.handler.clone());
        match tenant_handler {
            Some(tenant_handler) => {
                tenant_handler.acknowledge(acknowledge_token).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
