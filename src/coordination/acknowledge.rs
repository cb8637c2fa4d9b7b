//! Acknowledge state tracking.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::body_store::BodyStore;
use crate::connector::ConnectionId;
use crate::coordination::RelayError;
use crate::model::AcknowledgeRequest;
use crate::observability::metrics;
use crate::transport::TransportError;

/// Confirms receipt of a request through the connection that delivered it.
#[async_trait]
pub trait ConnectorAcknowledger: Send + Sync {
    async fn acknowledge_request(
        &self,
        connection_id: &ConnectionId,
        acknowledge_token: &str,
    ) -> Result<(), TransportError>;
}

/// What became of an incoming acknowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcknowledgeOutcome {
    /// Forwarded to the transport.
    Confirmed,
    /// The state was known but its token had been pruned.
    Pruned,
    /// No state for the request id.
    Unknown,
}

impl AcknowledgeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcknowledgeOutcome::Confirmed => "confirmed",
            AcknowledgeOutcome::Pruned => "pruned",
            AcknowledgeOutcome::Unknown => "unknown",
        }
    }
}

#[derive(Debug)]
struct AcknowledgeState {
    connection_id: ConnectionId,
    acknowledge_token: Option<String>,
    outsourced_body: bool,
    created_at: Instant,
}

/// Acknowledge states of requests delivered by this instance.
pub struct AcknowledgeCoordinator {
    states: DashMap<Uuid, AcknowledgeState>,
    connectors: Weak<dyn ConnectorAcknowledger>,
    body_store: Arc<dyn BodyStore>,
}

impl AcknowledgeCoordinator {
    pub fn new(connectors: Weak<dyn ConnectorAcknowledger>, body_store: Arc<dyn BodyStore>) -> Self {
        Self {
            states: DashMap::new(),
            connectors,
            body_store,
        }
    }

    /// Record that a request was delivered and awaits acknowledgement.
    ///
    /// A second registration for the same id replaces the first, which
    /// happens when the transport redelivers a message.
    pub fn register_request(
        &self,
        request_id: Uuid,
        connection_id: ConnectionId,
        acknowledge_token: Option<String>,
        outsourced_body: bool,
    ) {
        tracing::debug!(
            request_id = %request_id,
            connection_id = %connection_id,
            outsourced_body,
            "Registering acknowledge state"
        );
        let state = AcknowledgeState {
            connection_id,
            acknowledge_token,
            outsourced_body,
            created_at: Instant::now(),
        };
        if self.states.insert(request_id, state).is_some() {
            tracing::warn!(request_id = %request_id, "Acknowledge state replaced, request was delivered twice");
        }
    }

    /// Handle an acknowledge for a request delivered by this instance.
    pub async fn process_acknowledge(
        &self,
        request: &AcknowledgeRequest,
    ) -> Result<AcknowledgeOutcome, RelayError> {
        let Some((_, state)) = self.states.remove(&request.request_id) else {
            tracing::warn!(request_id = %request.request_id, "Unknown acknowledge request received");
            metrics::record_acknowledgement(AcknowledgeOutcome::Unknown.as_str());
            return Ok(AcknowledgeOutcome::Unknown);
        };

        let outcome = match &state.acknowledge_token {
            Some(token) => {
                match self.connectors.upgrade() {
                    Some(connectors) => {
                        connectors
                            .acknowledge_request(&state.connection_id, token)
                            .await?
                    }
                    None => {
                        return Err(RelayError::Transport(TransportError::ConnectionClosed(
                            state.connection_id.to_string(),
                        )))
                    }
                }
                AcknowledgeOutcome::Confirmed
            }
            None => {
                tracing::debug!(request_id = %request.request_id, "Acknowledge token already pruned, skipping transport");
                AcknowledgeOutcome::Pruned
            }
        };

        if state.outsourced_body && request.remove_request_body_content {
            self.body_store.remove_request_body(request.request_id).await?;
        }

        metrics::record_acknowledgement(outcome.as_str());
        tracing::debug!(
            request_id = %request.request_id,
            connection_id = %state.connection_id,
            outcome = outcome.as_str(),
            "Acknowledge processed"
        );
        Ok(outcome)
    }

    /// Clear every stored token. Called after transport recovery, when old
    /// tokens no longer refer to the same messages.
    pub fn prune_outstanding_acknowledge_ids(&self) -> usize {
        let mut pruned = 0;
        for mut state in self.states.iter_mut() {
            if state.acknowledge_token.take().is_some() {
                pruned += 1;
            }
        }
        tracing::info!(pruned, "Pruned outstanding acknowledge ids");
        pruned
    }

    /// Drop states older than `max_age`.
    pub fn remove_expired(&self, max_age: Duration) -> usize {
        let before = self.states.len();
        self.states.retain(|_, state| state.created_at.elapsed() < max_age);
        before.saturating_sub(self.states.len())
    }

    pub fn contains(&self, request_id: Uuid) -> bool {
        self.states.contains_key(&request_id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body_store::MemoryBodyStore;
    use crate::model::OriginId;
    use bytes::Bytes;
    use std::io::Cursor;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingAcknowledger {
        calls: Mutex<Vec<(ConnectionId, String)>>,
    }

    #[async_trait]
    impl ConnectorAcknowledger for RecordingAcknowledger {
        async fn acknowledge_request(
            &self,
            connection_id: &ConnectionId,
            acknowledge_token: &str,
        ) -> Result<(), TransportError> {
            self.calls
                .lock()
                .unwrap()
                .push((connection_id.clone(), acknowledge_token.to_string()));
            Ok(())
        }
    }

    fn coordinator() -> (AcknowledgeCoordinator, Arc<RecordingAcknowledger>, Arc<MemoryBodyStore>) {
        let acknowledger = Arc::new(RecordingAcknowledger::default());
        let store = Arc::new(MemoryBodyStore::new());
        let weak: Weak<RecordingAcknowledger> = Arc::downgrade(&acknowledger);
        let weak: Weak<dyn ConnectorAcknowledger> = weak;
        (AcknowledgeCoordinator::new(weak, store.clone()), acknowledger, store)
    }

    fn acknowledge(request_id: Uuid, remove_body: bool) -> AcknowledgeRequest {
        AcknowledgeRequest {
            request_id,
            origin_id: OriginId::new(),
            remove_request_body_content: remove_body,
        }
    }

    #[tokio::test]
    async fn test_confirmed_acknowledge_forwards_token() {
        let (coordinator, acknowledger, _) = coordinator();
        let request_id = Uuid::new_v4();
        let connection_id = ConnectionId::from("conn-a");
        coordinator.register_request(request_id, connection_id.clone(), Some("7".to_string()), false);

        let outcome = coordinator.process_acknowledge(&acknowledge(request_id, false)).await.unwrap();

        assert_eq!(outcome, AcknowledgeOutcome::Confirmed);
        assert_eq!(*acknowledger.calls.lock().unwrap(), vec![(connection_id, "7".to_string())]);
        assert!(coordinator.is_empty());
    }

    #[tokio::test]
    async fn test_acknowledge_is_applied_once() {
        let (coordinator, acknowledger, _) = coordinator();
        let request_id = Uuid::new_v4();
        coordinator.register_request(request_id, ConnectionId::from("conn-a"), Some("1".to_string()), false);

        coordinator.process_acknowledge(&acknowledge(request_id, false)).await.unwrap();
        let second = coordinator.process_acknowledge(&acknowledge(request_id, false)).await.unwrap();

        assert_eq!(second, AcknowledgeOutcome::Unknown);
        assert_eq!(acknowledger.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pruned_acknowledge_skips_transport() {
        let (coordinator, acknowledger, _) = coordinator();
        let request_id = Uuid::new_v4();
        coordinator.register_request(request_id, ConnectionId::from("conn-a"), Some("1".to_string()), false);

        assert_eq!(coordinator.prune_outstanding_acknowledge_ids(), 1);
        let outcome = coordinator.process_acknowledge(&acknowledge(request_id, false)).await.unwrap();

        assert_eq!(outcome, AcknowledgeOutcome::Pruned);
        assert!(acknowledger.calls.lock().unwrap().is_empty());
        assert!(coordinator.is_empty());
    }

    #[tokio::test]
    async fn test_outsourced_body_removed_on_request() {
        let (coordinator, _acknowledger, store) = coordinator();
        let kept = Uuid::new_v4();
        let removed = Uuid::new_v4();
        for id in [kept, removed] {
            store
                .store_request_body(id, Box::new(Cursor::new(Bytes::from_static(b"payload"))))
                .await
                .unwrap();
            coordinator.register_request(id, ConnectionId::from("conn-a"), Some(id.to_string()), true);
        }

        coordinator.process_acknowledge(&acknowledge(kept, false)).await.unwrap();
        coordinator.process_acknowledge(&acknowledge(removed, true)).await.unwrap();

        assert!(store.contains(crate::body_store::BodyKind::Request, kept));
        assert!(!store.contains(crate::body_store::BodyKind::Request, removed));
    }

    #[tokio::test]
    async fn test_registry_gone_reports_error() {
        let store = Arc::new(MemoryBodyStore::new());
        let weak: Weak<dyn ConnectorAcknowledger> = {
            let acknowledger: Arc<dyn ConnectorAcknowledger> = Arc::new(RecordingAcknowledger::default());
            Arc::downgrade(&acknowledger)
        };
        let coordinator = AcknowledgeCoordinator::new(weak, store);
        let request_id = Uuid::new_v4();
        coordinator.register_request(request_id, ConnectionId::from("conn-a"), Some("1".to_string()), false);

        let result = coordinator.process_acknowledge(&acknowledge(request_id, false)).await;
        assert!(matches!(result, Err(RelayError::Transport(TransportError::ConnectionClosed(_)))));
    }

    #[tokio::test]
    async fn test_remove_expired() {
        let (coordinator, _, _) = coordinator();
        coordinator.register_request(Uuid::new_v4(), ConnectionId::from("conn-a"), None, false);

        assert_eq!(coordinator.remove_expired(Duration::from_secs(60)), 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(coordinator.remove_expired(Duration::from_millis(10)), 1);
        assert!(coordinator.is_empty());
    }
}
