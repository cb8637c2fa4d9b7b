//! In-process broker.
//!
//! Several relay instances in one process can share a [`MemoryBroker`] to
//! exercise the cross-instance paths without an external broker.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

use crate::subscription::{Handler, Subscribers, Subscription};
use crate::transport::broker::{BrokerChannel, BrokerError, ConsumeMode, ConsumerTag, Delivery};

struct QueuedMessage {
    payload: Bytes,
    redelivered: bool,
}

struct Consumer {
    tag: ConsumerTag,
    channel_id: u64,
    mode: ConsumeMode,
    sender: mpsc::UnboundedSender<Delivery>,
}

#[derive(Default)]
struct Queue {
    pending: VecDeque<QueuedMessage>,
    consumers: Vec<Consumer>,
    next_consumer: usize,
}

struct Unacked {
    queue: String,
    consumer: ConsumerTag,
    payload: Bytes,
}

#[derive(Default)]
struct ChannelState {
    next_delivery_tag: u64,
    unacked: HashMap<u64, Unacked>,
    recovering: bool,
}

#[derive(Default)]
struct BrokerState {
    queues: HashMap<String, Queue>,
    channels: HashMap<u64, ChannelState>,
}

impl BrokerState {
    /// Hand pending messages to consumers, round robin.
    fn dispatch(&mut self, queue_name: &str) {
        let Some(queue) = self.queues.get_mut(queue_name) else {
            return;
        };

        while !queue.pending.is_empty() {
            queue.consumers.retain(|c| !c.sender.is_closed());
            let ready: Vec<usize> = queue
                .consumers
                .iter()
                .enumerate()
                .filter(|(_, c)| {
                    self.channels
                        .get(&c.channel_id)
                        .map(|channel| !channel.recovering)
                        .unwrap_or(false)
                })
                .map(|(index, _)| index)
                .collect();
            if ready.is_empty() {
                return;
            }

            let index = ready[queue.next_consumer % ready.len()];
            queue.next_consumer = queue.next_consumer.wrapping_add(1);
            let consumer = &queue.consumers[index];

            let Some(message) = queue.pending.pop_front() else {
                return;
            };
            let Some(channel) = self.channels.get_mut(&consumer.channel_id) else {
                queue.pending.push_front(message);
                return;
            };

            channel.next_delivery_tag += 1;
            let delivery_tag = channel.next_delivery_tag;
            if consumer.mode == ConsumeMode::ManualAck {
                channel.unacked.insert(
                    delivery_tag,
                    Unacked {
                        queue: queue_name.to_string(),
                        consumer: consumer.tag.clone(),
                        payload: message.payload.clone(),
                    },
                );
            }

            let delivery = Delivery {
                queue: queue_name.to_string(),
                delivery_tag,
                redelivered: message.redelivered,
                payload: message.payload,
            };
            if let Err(mpsc::error::SendError(delivery)) = consumer.sender.send(delivery) {
                channel.unacked.remove(&delivery_tag);
                queue.pending.push_front(QueuedMessage {
                    payload: delivery.payload,
                    redelivered: delivery.redelivered,
                });
            }
        }
    }

    /// Put unacked deliveries back at the head of their queues.
    fn requeue(&mut self, deliveries: Vec<Unacked>) -> Vec<String> {
        let mut touched = Vec::new();
        for unacked in deliveries.into_iter().rev() {
            self.queues
                .entry(unacked.queue.clone())
                .or_default()
                .pending
                .push_front(QueuedMessage {
                    payload: unacked.payload,
                    redelivered: true,
                });
            if !touched.contains(&unacked.queue) {
                touched.push(unacked.queue);
            }
        }
        touched
    }
}

/// Named queues shared by the channels opened on it.
pub struct MemoryBroker {
    state: Mutex<BrokerState>,
    available: AtomicBool,
    next_channel: AtomicU64,
    next_consumer: AtomicU64,
}

impl MemoryBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(BrokerState::default()),
            available: AtomicBool::new(true),
            next_channel: AtomicU64::new(0),
            next_consumer: AtomicU64::new(0),
        })
    }

    /// Simulate broker outages. While unavailable, publish and consume fail.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Messages waiting in a queue, excluding unacknowledged deliveries.
    pub fn pending(&self, queue: &str) -> usize {
        self.lock()
            .queues
            .get(queue)
            .map(|q| q.pending.len())
            .unwrap_or(0)
    }

    /// Deliveries awaiting acknowledgement across all channels.
    pub fn unacked(&self) -> usize {
        self.lock().channels.values().map(|c| c.unacked.len()).sum()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_available(&self) -> Result<(), BrokerError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(BrokerError::Unreachable)
        }
    }
}

/// A channel on a [`MemoryBroker`].
pub struct MemoryChannel {
    broker: Arc<MemoryBroker>,
    id: u64,
    recovery: Subscribers<()>,
}

impl MemoryChannel {
    pub fn open(broker: &Arc<MemoryBroker>) -> Arc<Self> {
        let id = broker.next_channel.fetch_add(1, Ordering::Relaxed) + 1;
        broker.lock().channels.insert(id, ChannelState::default());
        Arc::new(Self {
            broker: broker.clone(),
            id,
            recovery: Subscribers::new(),
        })
    }

    /// Simulate a connection loss followed by automatic recovery.
    ///
    /// Delivery tags restart, recovery observers run, then unacknowledged
    /// deliveries are requeued and redelivered.
    pub async fn recover(&self) {
        let requeued = {
            let mut state = self.broker.lock();
            let Some(channel) = state.channels.get_mut(&self.id) else {
                return;
            };
            channel.recovering = true;
            channel.next_delivery_tag = 0;
            let mut unacked: Vec<(u64, Unacked)> = channel.unacked.drain().collect();
            unacked.sort_unstable_by_key(|(tag, _)| *tag);
            unacked.into_iter().map(|(_, u)| u).collect::<Vec<_>>()
        };
        tracing::info!(channel = self.id, requeued = requeued.len(), "Broker channel recovered");

        self.recovery.notify(()).await;

        let mut state = self.broker.lock();
        if let Some(channel) = state.channels.get_mut(&self.id) {
            channel.recovering = false;
        }
        let mut queues = state.requeue(requeued);
        for (name, queue) in state.queues.iter() {
            let served = queue
                .consumers
                .iter()
                .any(|c| c.channel_id == self.id);
            if served && !queues.contains(name) {
                queues.push(name.clone());
            }
        }
        for queue in queues {
            state.dispatch(&queue);
        }
    }
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    async fn publish(&self, queue: &str, payload: Bytes) -> Result<(), BrokerError> {
        self.broker.ensure_available()?;
        let mut state = self.broker.lock();
        state
            .queues
            .entry(queue.to_string())
            .or_default()
            .pending
            .push_back(QueuedMessage {
                payload,
                redelivered: false,
            });
        state.dispatch(queue);
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        mode: ConsumeMode,
        handler: Handler<Delivery>,
    ) -> Result<ConsumerTag, BrokerError> {
        self.broker.ensure_available()?;
        let tag = ConsumerTag(format!(
            "consumer-{}",
            self.broker.next_consumer.fetch_add(1, Ordering::Relaxed) + 1
        ));
        let (sender, mut receiver) = mpsc::unbounded_channel::<Delivery>();

        tokio::spawn(async move {
            while let Some(delivery) = receiver.recv().await {
                handler(delivery).await;
            }
        });

        let mut state = self.broker.lock();
        state.queues.entry(queue.to_string()).or_default().consumers.push(Consumer {
            tag: tag.clone(),
            channel_id: self.id,
            mode,
            sender,
        });
        state.dispatch(queue);
        tracing::debug!(queue = %queue, consumer = %tag, "Consumer started");
        Ok(tag)
    }

    async fn cancel(&self, consumer: &ConsumerTag) -> Result<(), BrokerError> {
        let mut state = self.broker.lock();
        let queue_name = state
            .queues
            .iter()
            .find(|(_, q)| q.consumers.iter().any(|c| &c.tag == consumer))
            .map(|(name, _)| name.clone())
            .ok_or_else(|| BrokerError::UnknownConsumer(consumer.0.clone()))?;
        if let Some(queue) = state.queues.get_mut(&queue_name) {
            queue.consumers.retain(|c| &c.tag != consumer);
        }

        let requeued: Vec<Unacked> = match state.channels.get_mut(&self.id) {
            Some(channel) => {
                let mut tags: Vec<u64> = channel
                    .unacked
                    .iter()
                    .filter(|(_, u)| &u.consumer == consumer)
                    .map(|(tag, _)| *tag)
                    .collect();
                tags.sort_unstable();
                tags.into_iter()
                    .filter_map(|tag| channel.unacked.remove(&tag))
                    .collect()
            }
            None => Vec::new(),
        };
        for queue in state.requeue(requeued) {
            state.dispatch(&queue);
        }
        tracing::debug!(queue = %queue_name, consumer = %consumer, "Consumer cancelled");
        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        self.broker.ensure_available()?;
        let mut state = self.broker.lock();
        state
            .channels
            .get_mut(&self.id)
            .and_then(|channel| channel.unacked.remove(&delivery_tag))
            .map(|_| ())
            .ok_or(BrokerError::UnknownDeliveryTag(delivery_tag))
    }

    fn subscribe_recovery(&self, handler: Handler<()>) -> Subscription {
        self.recovery.subscribe(handler)
    }
}
