//! Relay core composition.
//!
//! # Data Flow
//! ```text
//! RelayCore::start(settings, backend, body store, statistics, connector transports)
//!     → origin recorded
//!     → ConnectorRegistry + AcknowledgeCoordinator (weakly linked)
//!     → ResponseCoordinator
//!     → tenant/server transports for the backend
//!     → RequestCoordinator, ResponseDispatcher, AcknowledgeDispatcher
//! ```
//!
//! # Design Decisions
//! - The core knows nothing about HTTP; the connector transport factory is injected
//! - The registry and the acknowledge coordinator are built together with
//!   `Arc::new_cyclic`, the coordinator holding a weak reference
//! - Broker recovery prunes outstanding acknowledge ids

use std::sync::{Arc, Weak};

use crate::body_store::BodyStore;
use crate::config::RelaySettings;
use crate::connector::ConnectorRegistry;
use crate::coordination::{AcknowledgeCoordinator, ConnectorAcknowledger, ResponseCoordinator};
use crate::dispatch::{AcknowledgeDispatcher, RequestCoordinator, ResponseDispatcher};
use crate::model::{Origin, OriginId};
use crate::statistics::StatisticsWriter;
use crate::subscription::{handler, Subscription};
use crate::tenant::TenantHandlerFactory;
use crate::transport::broker::{
    BrokerChannel, BrokerPublisher, BrokerServerTransport, BrokerTenantHandlerFactory, BrokerTenantTransport,
    MemoryBroker, MemoryChannel,
};
use crate::transport::in_process::{InProcessServerTransport, InProcessTenantHandlerFactory, InProcessTenantTransport};
use crate::transport::{ConnectorTransportFactory, ServerTransport, TenantTransport, TransportError};

/// How this instance reaches the others.
#[derive(Clone)]
pub enum TransportBackend {
    InProcess,
    Broker(Arc<MemoryBroker>),
}

/// The transport-routing and correlation core of one relay instance.
pub struct RelayCore {
    origin: Origin,
    settings: RelaySettings,
    body_store: Arc<dyn BodyStore>,
    statistics: Arc<dyn StatisticsWriter>,
    connectors: Arc<ConnectorRegistry>,
    responses: Arc<ResponseCoordinator>,
    requests: RequestCoordinator,
    response_dispatcher: ResponseDispatcher,
    acknowledge_dispatcher: AcknowledgeDispatcher,
    broker_server: Option<Arc<BrokerServerTransport>>,
    broker_consumer: Option<Arc<MemoryChannel>>,
    _recovery: Option<Subscription>,
}

impl RelayCore {
    pub async fn start(
        settings: RelaySettings,
        backend: TransportBackend,
        body_store: Arc<dyn BodyStore>,
        statistics: Arc<dyn StatisticsWriter>,
        connector_transports: Arc<dyn ConnectorTransportFactory>,
    ) -> Result<Self, TransportError> {
        let origin = Origin::start();
        let origin_id = origin.id;
        statistics.set_origin_started(&origin).await;

        let responses = Arc::new(ResponseCoordinator::new(body_store.clone()));

        let (connectors, tenant_transport, server_transport, broker_server, broker_consumer, recovery) = match backend {
            TransportBackend::InProcess => {
                let connectors = build_registry(
                    origin_id,
                    Arc::new(InProcessTenantHandlerFactory),
                    connector_transports,
                    body_store.clone(),
                    statistics.clone(),
                );
                let tenant_transport: Arc<dyn TenantTransport> =
                    Arc::new(InProcessTenantTransport::new(connectors.clone()));
                let server_transport: Arc<dyn ServerTransport> = Arc::new(InProcessServerTransport::new());
                (connectors, tenant_transport, server_transport, None, None, None)
            }
            TransportBackend::Broker(broker) => {
                let publisher = Arc::new(BrokerPublisher::new(MemoryChannel::open(&broker)));
                let consumer = MemoryChannel::open(&broker);
                let consumer_channel: Arc<dyn BrokerChannel> = consumer.clone();

                let connectors = build_registry(
                    origin_id,
                    Arc::new(BrokerTenantHandlerFactory::new(origin_id, consumer_channel.clone())),
                    connector_transports,
                    body_store.clone(),
                    statistics.clone(),
                );

                let acknowledges = connectors.acknowledges().clone();
                let recovery = consumer_channel.subscribe_recovery(handler(move |_: ()| {
                    let acknowledges = acknowledges.clone();
                    async move {
                        acknowledges.prune_outstanding_acknowledge_ids();
                    }
                }));

                let broker_server =
                    BrokerServerTransport::start(origin_id, publisher.clone(), consumer_channel).await?;
                let tenant_transport: Arc<dyn TenantTransport> = Arc::new(BrokerTenantTransport::new(publisher));
                let server_transport: Arc<dyn ServerTransport> = broker_server.clone();
                (
                    connectors,
                    tenant_transport,
                    server_transport,
                    Some(broker_server),
                    Some(consumer),
                    Some(recovery),
                )
            }
        };

        let shortcut = settings.enable_server_transport_shortcut;
        let requests = RequestCoordinator::new(tenant_transport, body_store.clone(), settings.maximum_binary_size);
        let response_dispatcher =
            ResponseDispatcher::new(origin_id, shortcut, responses.clone(), server_transport.clone());
        let acknowledge_dispatcher = AcknowledgeDispatcher::new(
            origin_id,
            shortcut,
            connectors.acknowledges().clone(),
            server_transport,
        );

        tracing::info!(
            origin_id = %origin_id,
            shortcut,
            maximum_binary_size = settings.maximum_binary_size,
            "Relay core started"
        );

        Ok(Self {
            origin,
            settings,
            body_store,
            statistics,
            connectors,
            responses,
            requests,
            response_dispatcher,
            acknowledge_dispatcher,
            broker_server,
            broker_consumer,
            _recovery: recovery,
        })
    }

    pub fn origin_id(&self) -> OriginId {
        self.origin.id
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    pub fn body_store(&self) -> &Arc<dyn BodyStore> {
        &self.body_store
    }

    pub fn statistics(&self) -> &Arc<dyn StatisticsWriter> {
        &self.statistics
    }

    pub fn connectors(&self) -> &Arc<ConnectorRegistry> {
        &self.connectors
    }

    pub fn acknowledges(&self) -> &Arc<AcknowledgeCoordinator> {
        self.connectors.acknowledges()
    }

    pub fn responses(&self) -> &Arc<ResponseCoordinator> {
        &self.responses
    }

    pub fn requests(&self) -> &RequestCoordinator {
        &self.requests
    }

    pub fn response_dispatcher(&self) -> &ResponseDispatcher {
        &self.response_dispatcher
    }

    pub fn acknowledge_dispatcher(&self) -> &AcknowledgeDispatcher {
        &self.acknowledge_dispatcher
    }

    /// The channel consuming tenant requests and origin messages, when a broker is used.
    pub fn broker_consumer(&self) -> Option<&Arc<MemoryChannel>> {
        self.broker_consumer.as_ref()
    }

    /// Unregister all connectors, stop consuming and record the origin shutdown.
    pub async fn shutdown(&self) {
        tracing::info!(origin_id = %self.origin.id, connectors = self.connectors.connection_count(), "Relay core shutting down");
        self.connectors.unregister_all().await;
        if let Some(broker_server) = &self.broker_server {
            broker_server.stop().await;
        }
        self.statistics.set_origin_shutdown(self.origin.id).await;
    }
}

fn build_registry(
    origin_id: OriginId,
    handler_factory: Arc<dyn TenantHandlerFactory>,
    connector_transports: Arc<dyn ConnectorTransportFactory>,
    body_store: Arc<dyn BodyStore>,
    statistics: Arc<dyn StatisticsWriter>,
) -> Arc<ConnectorRegistry> {
    Arc::new_cyclic(|registry: &Weak<ConnectorRegistry>| {
        let acknowledger: Weak<dyn ConnectorAcknowledger> = registry.clone();
        let acknowledges = Arc::new(AcknowledgeCoordinator::new(acknowledger, body_store));
        ConnectorRegistry::new(origin_id, acknowledges, handler_factory, connector_transports, statistics)
    })
}
