//! Message-broker transport.
//!
//! # Data Flow
//! ```text
//! Origin A (HTTP call)                     Origin B (hosts the connector)
//!   BrokerTenantTransport
//!     → "Requests <tenant>"  ─────────────→ BrokerTenantHandler (manual ack)
//!                                             → registration → connector
//!   BrokerServerTransport   ←─────────────  "Acknowledges <B>" / "Responses <A>"
//! ```
//!
//! # Design Decisions
//! - Channels follow AMQP semantics: named queues, competing consumers,
//!   per-channel delivery tags that are invalidated by recovery
//! - Publishing goes through one channel guarded by an async mutex
//! - Consuming uses a separate channel so acknowledgements never wait on publishes

pub mod memory;
pub mod server;
pub mod tenant;

pub use memory::{MemoryBroker, MemoryChannel};
pub use server::BrokerServerTransport;
pub use tenant::{BrokerTenantHandler, BrokerTenantHandlerFactory, BrokerTenantTransport};

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::model::OriginId;
use crate::subscription::{Handler, Subscription};
use crate::transport::TransportError;

/// Queue carrying requests for a tenant.
pub fn requests_queue(tenant_name: &str) -> String {
    format!("Requests {}", tenant_name.to_lowercase())
}

/// Queue carrying responses for an origin.
pub fn responses_queue(origin_id: OriginId) -> String {
    format!("Responses {}", origin_id)
}

/// Queue carrying acknowledgements for an origin.
pub fn acknowledges_queue(origin_id: OriginId) -> String {
    format!("Acknowledges {}", origin_id)
}

/// Broker-level failures.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker is unreachable")]
    Unreachable,

    #[error("unknown delivery tag {0}")]
    UnknownDeliveryTag(u64),

    #[error("unknown consumer {0}")]
    UnknownConsumer(String),
}

/// How a consumer confirms deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeMode {
    /// Removed from the queue as soon as delivered.
    AutoAck,
    /// Kept unacknowledged until [`BrokerChannel::ack`].
    ManualAck,
}

/// A message handed to a consumer.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub queue: String,
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub payload: Bytes,
}

/// Identifies a consumer for cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsumerTag(pub String);

impl std::fmt::Display for ConsumerTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An AMQP-style channel.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    async fn publish(&self, queue: &str, payload: Bytes) -> Result<(), BrokerError>;

    /// Start consuming a queue. Deliveries to one consumer are handled one at a time.
    async fn consume(
        &self,
        queue: &str,
        mode: ConsumeMode,
        handler: Handler<Delivery>,
    ) -> Result<ConsumerTag, BrokerError>;

    /// Stop a consumer. Its unacknowledged deliveries are requeued.
    async fn cancel(&self, consumer: &ConsumerTag) -> Result<(), BrokerError>;

    /// Acknowledge a delivery made on this channel.
    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError>;

    /// Observe channel recovery. After recovery, earlier delivery tags are invalid.
    fn subscribe_recovery(&self, handler: Handler<()>) -> Subscription;
}

/// Serializes messages and publishes them through a shared channel.
pub struct BrokerPublisher {
    channel: Mutex<Arc<dyn BrokerChannel>>,
}

impl BrokerPublisher {
    pub fn new(channel: Arc<dyn BrokerChannel>) -> Self {
        Self {
            channel: Mutex::new(channel),
        }
    }

    pub async fn publish_json<T: Serialize + Sync>(&self, queue: &str, message: &T) -> Result<(), TransportError> {
        let payload = Bytes::from(serde_json::to_vec(message)?);
        let channel = self.channel.lock().await;
        channel
            .publish(queue, payload)
            .await
            .map_err(|e| TransportError::Publish {
                address: queue.to_string(),
                reason: e.to_string(),
            })
    }
}
