//! Origin-addressed messages over the broker.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex};

use crate::model::{AcknowledgeRequest, OriginId, TargetResponse};
use crate::subscription::{handler, Handler, Subscribers, Subscription};
use crate::transport::broker::{
    acknowledges_queue, responses_queue, BrokerChannel, BrokerPublisher, ConsumeMode, ConsumerTag, Delivery,
};
use crate::transport::{ServerTransport, TransportError};

/// Publishes responses and acknowledgements to their origin's queues and
/// consumes the local origin's queues.
pub struct BrokerServerTransport {
    origin_id: OriginId,
    publisher: Arc<BrokerPublisher>,
    consumer: Arc<dyn BrokerChannel>,
    responses: Arc<Subscribers<TargetResponse>>,
    acknowledges: Arc<Subscribers<AcknowledgeRequest>>,
    consumer_tags: Mutex<Vec<ConsumerTag>>,
}

impl BrokerServerTransport {
    /// Start consuming the local origin's response and acknowledge queues.
    pub async fn start(
        origin_id: OriginId,
        publisher: Arc<BrokerPublisher>,
        consumer: Arc<dyn BrokerChannel>,
    ) -> Result<Arc<Self>, TransportError> {
        let transport = Arc::new(Self {
            origin_id,
            publisher,
            consumer,
            responses: Arc::new(Subscribers::new()),
            acknowledges: Arc::new(Subscribers::new()),
            consumer_tags: Mutex::new(Vec::new()),
        });

        let responses = responses_queue(origin_id);
        let tag = transport
            .consume(&responses, forward(transport.responses.clone()))
            .await?;
        transport.track(tag);

        let acknowledges = acknowledges_queue(origin_id);
        let tag = transport
            .consume(&acknowledges, forward(transport.acknowledges.clone()))
            .await?;
        transport.track(tag);

        tracing::info!(origin_id = %origin_id, "Broker server transport started");
        Ok(transport)
    }

    /// Stop consuming.
    pub async fn stop(&self) {
        let tags: Vec<ConsumerTag> = std::mem::take(
            &mut *self
                .consumer_tags
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for tag in tags {
            if let Err(e) = self.consumer.cancel(&tag).await {
                tracing::warn!(origin_id = %self.origin_id, consumer = %tag, error = %e, "Failed to cancel consumer");
            }
        }
    }

    async fn consume(&self, queue: &str, handler: Handler<Delivery>) -> Result<ConsumerTag, TransportError> {
        self.consumer
            .consume(queue, ConsumeMode::AutoAck, handler)
            .await
            .map_err(|e| TransportError::Consume {
                address: queue.to_string(),
                reason: e.to_string(),
            })
    }

    fn track(&self, tag: ConsumerTag) {
        self.consumer_tags
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tag);
    }
}

/// Decode deliveries and hand them to subscribers. Undecodable messages are dropped.
fn forward<T>(subscribers: Arc<Subscribers<T>>) -> Handler<Delivery>
where
    T: DeserializeOwned + Clone + Send + 'static,
{
    handler(move |delivery: Delivery| {
        let subscribers = subscribers.clone();
        async move {
            match serde_json::from_slice::<T>(&delivery.payload) {
                Ok(message) => subscribers.notify(message).await,
                Err(e) => tracing::error!(queue = %delivery.queue, error = %e, "Dropping undecodable message"),
            }
        }
    })
}

#[async_trait]
impl ServerTransport for BrokerServerTransport {
    async fn dispatch_response(&self, response: TargetResponse) -> Result<(), TransportError> {
        let queue = responses_queue(response.request_origin_id);
        self.publisher.publish_json(&queue, &response).await
    }

    async fn dispatch_acknowledge(&self, request: AcknowledgeRequest) -> Result<(), TransportError> {
        let queue = acknowledges_queue(request.origin_id);
        self.publisher.publish_json(&queue, &request).await
    }

    fn subscribe_responses(&self, handler: Handler<TargetResponse>) -> Subscription {
        self.responses.subscribe(handler)
    }

    fn subscribe_acknowledges(&self, handler: Handler<AcknowledgeRequest>) -> Subscription {
        self.acknowledges.subscribe(handler)
    }
}
