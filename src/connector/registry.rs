//! Live connector registrations per tenant.

use async_trait::async_trait;
use dashmap::DashMap;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::connector::{ConnectionId, ConnectorRegistration};
use crate::coordination::{AcknowledgeCoordinator, ConnectorAcknowledger};
use crate::model::{unix_millis, ClientRequest, OriginId};
use crate::observability::metrics;
use crate::statistics::{ConnectionInfo, StatisticsWriter};
use crate::tenant::{TenantHandlerFactory, TenantHandlerRegistry};
use crate::transport::{ConnectorTransportFactory, TransportError};

type TenantConnections = HashMap<ConnectionId, Arc<ConnectorRegistration>>;

/// Registry of the connector connections hosted by this instance.
pub struct ConnectorRegistry {
    origin_id: OriginId,
    registrations: DashMap<ConnectionId, Arc<ConnectorRegistration>>,
    tenants: DashMap<String, TenantConnections>,
    handlers: TenantHandlerRegistry,
    transports: Arc<dyn ConnectorTransportFactory>,
    acknowledges: Arc<AcknowledgeCoordinator>,
    statistics: Arc<dyn StatisticsWriter>,
}

impl ConnectorRegistry {
    pub fn new(
        origin_id: OriginId,
        acknowledges: Arc<AcknowledgeCoordinator>,
        handler_factory: Arc<dyn TenantHandlerFactory>,
        transports: Arc<dyn ConnectorTransportFactory>,
        statistics: Arc<dyn StatisticsWriter>,
    ) -> Self {
        Self {
            origin_id,
            registrations: DashMap::new(),
            tenants: DashMap::new(),
            handlers: TenantHandlerRegistry::new(handler_factory),
            transports,
            acknowledges,
            statistics,
        }
    }

    pub fn acknowledges(&self) -> &Arc<AcknowledgeCoordinator> {
        &self.acknowledges
    }

    /// Register a connection for a tenant.
    ///
    /// Registering a connection id that is already present replaces the
    /// previous registration and disposes it.
    pub async fn register(
        &self,
        connection_id: ConnectionId,
        tenant_name: &str,
        remote_address: Option<SocketAddr>,
    ) -> Result<Arc<ConnectorRegistration>, TransportError> {
        tracing::debug!(connection_id = %connection_id, tenant = %tenant_name, "Registering connector");

        let transport = self.transports.create(&connection_id);
        let registration = Arc::new(ConnectorRegistration::new(
            connection_id.clone(),
            tenant_name,
            remote_address,
            transport,
            self.acknowledges.clone(),
        ));

        let replaced_binding = match self
            .handlers
            .bind(tenant_name, &connection_id, registration.clone())
            .await
        {
            Ok(replaced) => replaced,
            Err(e) => {
                tracing::error!(connection_id = %connection_id, tenant = %tenant_name, error = %e, "Failed to bind tenant handler");
                registration.dispose().await;
                return Err(e);
            }
        };

        if let Some(previous) = self
            .registrations
            .insert(connection_id.clone(), registration.clone())
        {
            tracing::warn!(
                connection_id = %connection_id,
                previous_tenant = %previous.tenant_name(),
                "Connection id registered twice, replacing previous registration"
            );
            self.remove_from_tenant(previous.tenant_name(), &connection_id);
            previous.dispose().await;
        }
        self.tenants
            .entry(tenant_name.to_string())
            .or_default()
            .insert(connection_id.clone(), registration.clone());

        if let Some(binding) = replaced_binding {
            binding.dispose().await;
        }

        metrics::record_connectors(self.registrations.len());
        self.statistics
            .set_connection_opened(&ConnectionInfo {
                connection_id: connection_id.clone(),
                tenant_name: tenant_name.to_string(),
                origin_id: self.origin_id,
                remote_address,
                connected_at: unix_millis(),
            })
            .await;

        tracing::info!(connection_id = %connection_id, tenant = %tenant_name, "Connector registered");
        Ok(registration)
    }

    /// Remove a connection. Unknown ids are ignored.
    pub async fn unregister(&self, connection_id: &ConnectionId) {
        let Some((_, registration)) = self.registrations.remove(connection_id) else {
            tracing::warn!(connection_id = %connection_id, "Unregistering unknown connection");
            return;
        };
        self.remove_from_tenant(registration.tenant_name(), connection_id);

        if let Some(binding) = self.handlers.unbind(connection_id) {
            binding.dispose().await;
        }
        registration.dispose().await;

        metrics::record_connectors(self.registrations.len());
        self.statistics.set_connection_closed(connection_id).await;
        tracing::info!(connection_id = %connection_id, tenant = %registration.tenant_name(), "Connector unregistered");
    }

    /// Unregister every connection, used on shutdown.
    pub async fn unregister_all(&self) {
        let connection_ids: Vec<ConnectionId> = self
            .registrations
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for connection_id in connection_ids {
            self.unregister(&connection_id).await;
        }
    }

    /// Send a request to a specific connection. Unknown connections drop the request.
    pub async fn transport_request(
        &self,
        connection_id: &ConnectionId,
        request: ClientRequest,
    ) -> Result<(), TransportError> {
        let registration = self.registrations.get(connection_id).map(|r| r.value().clone());
        match registration {
            Some(registration) => registration.transport_request(request).await,
            None => {
                tracing::warn!(
                    connection_id = %connection_id,
                    request_id = %request.request_id,
                    "Dropping request for unknown connection"
                );
                Ok(())
            }
        }
    }

    /// Confirm receipt through the tenant handler bound to a connection.
    pub async fn acknowledge_request(
        &self,
        connection_id: &ConnectionId,
        acknowledge_token: &str,
    ) -> Result<(), TransportError> {
        if !self.handlers.acknowledge(connection_id, acknowledge_token).await? {
            tracing::warn!(
                connection_id = %connection_id,
                acknowledge_token = %acknowledge_token,
                "Acknowledge for unknown connection"
            );
        }
        Ok(())
    }

    /// Deliver a request to a random connection of its tenant.
    ///
    /// Returns `false` when the tenant has no connection on this instance.
    pub async fn try_deliver_request(&self, mut request: ClientRequest) -> Result<bool, TransportError> {
        let candidates: Vec<Arc<ConnectorRegistration>> = self
            .tenants
            .get(&request.tenant_name)
            .map(|connections| connections.values().cloned().collect())
            .unwrap_or_default();

        let Some(registration) = candidates.choose(&mut rand::thread_rng()).cloned() else {
            tracing::debug!(tenant = %request.tenant_name, request_id = %request.request_id, "No connector for tenant");
            return Ok(false);
        };

        request.acknowledge_origin_id.get_or_insert(self.origin_id);
        let acknowledge_token = Some(request.request_id.to_string());
        registration.deliver_request(request, acknowledge_token).await?;
        Ok(true)
    }

    pub fn connection_count(&self) -> usize {
        self.registrations.len()
    }

    pub fn tenant_connection_count(&self, tenant_name: &str) -> usize {
        self.tenants.get(tenant_name).map(|c| c.len()).unwrap_or(0)
    }

    pub fn get(&self, connection_id: &ConnectionId) -> Option<Arc<ConnectorRegistration>> {
        self.registrations.get(connection_id).map(|r| r.value().clone())
    }

    fn remove_from_tenant(&self, tenant_name: &str, connection_id: &ConnectionId) {
        if let Some(mut connections) = self.tenants.get_mut(tenant_name) {
            connections.remove(connection_id);
        }
        self.tenants.remove_if(tenant_name, |_, connections| connections.is_empty());
    }
}

#[async_trait]
impl ConnectorAcknowledger for ConnectorRegistry {
    async fn acknowledge_request(
        &self,
        connection_id: &ConnectionId,
        acknowledge_token: &str,
    ) -> Result<(), TransportError> {
        ConnectorRegistry::acknowledge_request(self, connection_id, acknowledge_token).await
    }
}
