//! Tenant-addressed requests over the broker.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::connector::ConnectionId;
use crate::model::{AcknowledgeMode, ClientRequest, OriginId};
use crate::subscription::{handler, Handler, Subscribers, Subscription};
use crate::tenant::{ReceivedRequest, TenantHandler, TenantHandlerFactory};
use crate::transport::broker::{requests_queue, BrokerChannel, BrokerPublisher, ConsumeMode, ConsumerTag, Delivery};
use crate::transport::{TenantTransport, TransportError};

/// Publishes requests to their tenant's queue.
pub struct BrokerTenantTransport {
    publisher: Arc<BrokerPublisher>,
}

impl BrokerTenantTransport {
    pub fn new(publisher: Arc<BrokerPublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl TenantTransport for BrokerTenantTransport {
    async fn transport(&self, request: ClientRequest) -> Result<(), TransportError> {
        let queue = requests_queue(&request.tenant_name);
        self.publisher.publish_json(&queue, &request).await
    }
}

/// Consumes a tenant's request queue for one connection.
pub struct BrokerTenantHandler {
    tenant_name: String,
    connection_id: ConnectionId,
    origin_id: OriginId,
    channel: Arc<dyn BrokerChannel>,
    requests: Arc<Subscribers<ReceivedRequest>>,
    consumer: Mutex<Option<ConsumerTag>>,
}

impl BrokerTenantHandler {
    fn delivery_handler(&self) -> Handler<Delivery> {
        let channel = self.channel.clone();
        let requests = self.requests.clone();
        let origin_id = self.origin_id;
        let connection_id = self.connection_id.clone();

        handler(move |delivery: Delivery| {
            let channel = channel.clone();
            let requests = requests.clone();
            let connection_id = connection_id.clone();
            async move {
                let mut request: ClientRequest = match serde_json::from_slice(&delivery.payload) {
                    Ok(request) => request,
                    Err(e) => {
                        tracing::error!(queue = %delivery.queue, error = %e, "Dropping undecodable request");
                        if let Err(e) = channel.ack(delivery.delivery_tag).await {
                            tracing::warn!(delivery_tag = delivery.delivery_tag, error = %e, "Failed to remove undecodable request");
                        }
                        return;
                    }
                };
                request.acknowledge_origin_id = Some(origin_id);

                let acknowledge_token = if request.acknowledge_mode == AcknowledgeMode::Disabled {
                    if let Err(e) = channel.ack(delivery.delivery_tag).await {
                        tracing::warn!(request_id = %request.request_id, error = %e, "Failed to acknowledge on receipt");
                    }
                    None
                } else {
                    Some(delivery.delivery_tag.to_string())
                };

                tracing::debug!(
                    connection_id = %connection_id,
                    request_id = %request.request_id,
                    redelivered = delivery.redelivered,
                    "Request received from broker"
                );
                requests
                    .notify(ReceivedRequest {
                        request,
                        acknowledge_token,
                    })
                    .await;
            }
        })
    }
}

#[async_trait]
impl TenantHandler for BrokerTenantHandler {
    fn subscribe(&self, handler: Handler<ReceivedRequest>) -> Subscription {
        self.requests.subscribe(handler)
    }

    async fn start(&self) -> Result<(), TransportError> {
        let queue = requests_queue(&self.tenant_name);
        let tag = self
            .channel
            .consume(&queue, ConsumeMode::ManualAck, self.delivery_handler())
            .await
            .map_err(|e| TransportError::Consume {
                address: queue.clone(),
                reason: e.to_string(),
            })?;
        tracing::debug!(tenant = %self.tenant_name, connection_id = %self.connection_id, consumer = %tag, "Consuming tenant requests");
        *self.consumer.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(tag);
        Ok(())
    }

    async fn acknowledge(&self, acknowledge_token: &str) -> Result<(), TransportError> {
        let delivery_tag: u64 = acknowledge_token
            .parse()
            .map_err(|_| TransportError::Acknowledge(format!("invalid delivery tag {}", acknowledge_token)))?;
        self.channel
            .ack(delivery_tag)
            .await
            .map_err(|e| TransportError::Acknowledge(e.to_string()))
    }

    async fn dispose(&self) {
        let consumer = self
            .consumer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(tag) = consumer {
            if let Err(e) = self.channel.cancel(&tag).await {
                tracing::warn!(tenant = %self.tenant_name, consumer = %tag, error = %e, "Failed to cancel tenant consumer");
            }
        }
    }
}

/// Creates broker tenant handlers sharing one consuming channel.
pub struct BrokerTenantHandlerFactory {
    origin_id: OriginId,
    channel: Arc<dyn BrokerChannel>,
}

impl BrokerTenantHandlerFactory {
    pub fn new(origin_id: OriginId, channel: Arc<dyn BrokerChannel>) -> Self {
        Self { origin_id, channel }
    }
}

#[async_trait]
impl TenantHandlerFactory for BrokerTenantHandlerFactory {
    async fn create(
        &self,
        tenant_name: &str,
        connection_id: &ConnectionId,
    ) -> Result<Arc<dyn TenantHandler>, TransportError> {
        Ok(Arc::new(BrokerTenantHandler {
            tenant_name: tenant_name.to_string(),
            connection_id: connection_id.clone(),
            origin_id: self.origin_id,
            channel: self.channel.clone(),
            requests: Arc::new(Subscribers::new()),
            consumer: Mutex::new(None),
        }))
    }
}
