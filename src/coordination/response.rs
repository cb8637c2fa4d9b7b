//! Response waiting states.

use bytes::Bytes;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::body_store::{BodyReader, BodyRemoval, BodyStore, RemovingReader};
use crate::coordination::RelayError;
use crate::model::TargetResponse;

/// Body of a relayed response.
pub enum ResponseBody {
    Empty,
    Inline(Bytes),
    /// Streamed from the body store; the stored entry is removed when the reader drops.
    Outsourced(BodyReader),
}

impl ResponseBody {
    /// Buffer the whole body.
    pub async fn into_bytes(self) -> std::io::Result<Bytes> {
        match self {
            ResponseBody::Empty => Ok(Bytes::new()),
            ResponseBody::Inline(bytes) => Ok(bytes),
            ResponseBody::Outsourced(mut reader) => {
                let mut buffer = Vec::new();
                reader.read_to_end(&mut buffer).await?;
                Ok(Bytes::from(buffer))
            }
        }
    }
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Empty => f.write_str("Empty"),
            ResponseBody::Inline(bytes) => f.debug_tuple("Inline").field(&bytes.len()).finish(),
            ResponseBody::Outsourced(_) => f.write_str("Outsourced"),
        }
    }
}

/// A response handed back to the waiting caller.
#[derive(Debug)]
pub struct RelayedResponse {
    pub response: TargetResponse,
    pub body: ResponseBody,
}

struct WaitingState {
    sender: Option<oneshot::Sender<TargetResponse>>,
    receiver: Option<oneshot::Receiver<TargetResponse>>,
    created_at: Instant,
}

impl WaitingState {
    fn new() -> Self {
        let (sender, receiver) = oneshot::channel();
        Self {
            sender: Some(sender),
            receiver: Some(receiver),
            created_at: Instant::now(),
        }
    }
}

/// Waiting states plus tombstones of requests whose caller gave up.
#[derive(Default)]
struct States {
    waiting: DashMap<Uuid, WaitingState>,
    abandoned: DashMap<Uuid, Instant>,
}

impl States {
    /// Replace the waiting state with a tombstone. Returns the removed state.
    fn abandon(&self, request_id: Uuid) -> Option<WaitingState> {
        let (_, state) = self.waiting.remove(&request_id)?;
        self.abandoned.insert(request_id, Instant::now());
        Some(state)
    }
}

/// The response a waiting state received but nobody consumed.
fn unconsumed(state: WaitingState) -> Option<TargetResponse> {
    state.receiver?.try_recv().ok()
}

/// Removes the waiting state of a request when the caller's scope ends.
///
/// An unresolved state leaves a tombstone so a late response is discarded
/// together with its outsourced body.
#[must_use = "dropping the guard discards the waiting state"]
pub struct ResponseWaitGuard {
    states: Weak<States>,
    body_store: Arc<dyn BodyStore>,
    request_id: Uuid,
}

impl ResponseWaitGuard {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }
}

impl Drop for ResponseWaitGuard {
    fn drop(&mut self) {
        let Some(states) = self.states.upgrade() else {
            return;
        };
        let Some(state) = states.abandon(self.request_id) else {
            return;
        };
        tracing::debug!(request_id = %self.request_id, "Discarded unresolved waiting state");

        if unconsumed(state).is_some_and(|response| response.is_body_outsourced()) {
            // Removed in the background.
            drop(BodyRemoval::response(self.body_store.clone(), self.request_id));
        }
    }
}

/// Waiting states of requests issued by this instance.
pub struct ResponseCoordinator {
    states: Arc<States>,
    body_store: Arc<dyn BodyStore>,
}

impl ResponseCoordinator {
    pub fn new(body_store: Arc<dyn BodyStore>) -> Self {
        Self {
            states: Arc::new(States::default()),
            body_store,
        }
    }

    /// Create (or reuse) the waiting state for a request.
    pub fn register_request(&self, request_id: Uuid) -> ResponseWaitGuard {
        self.states.abandoned.remove(&request_id);
        self.states.waiting.entry(request_id).or_insert_with(WaitingState::new);
        ResponseWaitGuard {
            states: Arc::downgrade(&self.states),
            body_store: self.body_store.clone(),
            request_id,
        }
    }

    /// Wait for the response of a registered request.
    ///
    /// Cancelling abandons the wait and removes the state.
    pub async fn get_response(
        &self,
        request_id: Uuid,
        cancellation: &CancellationToken,
    ) -> Result<RelayedResponse, RelayError> {
        let receiver = self
            .states
            .waiting
            .get_mut(&request_id)
            .and_then(|mut state| state.receiver.take())
            .ok_or(RelayError::NotRegistered(request_id))?;

        let received = tokio::select! {
            biased;
            received = receiver => received,
            _ = cancellation.cancelled() => {
                self.states.abandon(request_id);
                tracing::debug!(request_id = %request_id, "Stopped waiting for response");
                return Err(RelayError::Cancelled(request_id));
            }
        };
        self.states.waiting.remove(&request_id);

        let response = received.map_err(|_| RelayError::Discarded(request_id))?;
        let body = if response.is_body_outsourced() {
            let reader = self.body_store.open_response_body(request_id).await?;
            let removal = BodyRemoval::response(self.body_store.clone(), request_id);
            ResponseBody::Outsourced(Box::new(RemovingReader::new(reader, removal)))
        } else {
            match &response.body_content {
                Some(content) if !content.is_empty() => ResponseBody::Inline(content.clone()),
                _ => ResponseBody::Empty,
            }
        };

        Ok(RelayedResponse { response, body })
    }

    /// Resolve the waiting state of a response's request.
    ///
    /// Returns `false` when the response was discarded: its caller gave up,
    /// the state was already resolved or the waiter is gone.
    pub async fn process_response(&self, response: TargetResponse) -> bool {
        let request_id = response.request_id;
        if self.states.abandoned.contains_key(&request_id) {
            tracing::debug!(request_id = %request_id, "Caller stopped waiting, discarding late response");
            self.discard_body(&response).await;
            return false;
        }

        let sender = self
            .states
            .waiting
            .entry(request_id)
            .or_insert_with(WaitingState::new)
            .sender
            .take();

        match sender {
            Some(sender) => match sender.send(response) {
                Ok(()) => {
                    tracing::debug!(request_id = %request_id, "Response handed to waiter");
                    true
                }
                Err(response) => {
                    tracing::debug!(request_id = %request_id, "Waiter is gone, discarding response");
                    self.discard_body(&response).await;
                    false
                }
            },
            None => {
                // The first response owns the stored body.
                tracing::debug!(request_id = %request_id, "Waiting state already resolved, discarding response");
                false
            }
        }
    }

    /// Drop waiting states and tombstones older than `max_age`, along with
    /// outsourced bodies of responses nobody consumed.
    ///
    /// Returns the number of removed waiting states.
    pub async fn remove_expired(&self, max_age: Duration) -> usize {
        self.states
            .abandoned
            .retain(|_, abandoned_at| abandoned_at.elapsed() < max_age);

        let expired: Vec<Uuid> = self
            .states
            .waiting
            .iter()
            .filter(|state| state.created_at.elapsed() >= max_age)
            .map(|state| *state.key())
            .collect();

        let mut removed = 0;
        for request_id in expired {
            let Some((_, state)) = self
                .states
                .waiting
                .remove_if(&request_id, |_, state| state.created_at.elapsed() >= max_age)
            else {
                continue;
            };
            removed += 1;
            if let Some(response) = unconsumed(state) {
                self.discard_body(&response).await;
            }
        }
        removed
    }

    async fn discard_body(&self, response: &TargetResponse) {
        if !response.is_body_outsourced() {
            return;
        }
        if let Err(e) = self.body_store.remove_response_body(response.request_id).await {
            tracing::warn!(request_id = %response.request_id, error = %e, "Failed to remove discarded response body");
        }
    }

    pub fn contains(&self, request_id: Uuid) -> bool {
        self.states.waiting.contains_key(&request_id)
    }

    pub fn len(&self) -> usize {
        self.states.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.waiting.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body_store::{BodyKind, MemoryBodyStore};
    use crate::model::{ClientRequest, OriginId};
    use std::io::Cursor;

    fn coordinator() -> (Arc<ResponseCoordinator>, Arc<MemoryBodyStore>) {
        let store = Arc::new(MemoryBodyStore::new());
        (Arc::new(ResponseCoordinator::new(store.clone())), store)
    }

    fn response_for(request_id: Uuid, status: u16) -> TargetResponse {
        let mut request = ClientRequest::new("acme", "api", OriginId::new());
        request.request_id = request_id;
        TargetResponse::for_request(&request, status)
    }

    #[tokio::test]
    async fn test_response_after_registration() {
        let (coordinator, _) = coordinator();
        let request_id = Uuid::new_v4();
        let _guard = coordinator.register_request(request_id);

        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .get_response(request_id, &CancellationToken::new())
                    .await
            })
        };
        tokio::task::yield_now().await;

        assert!(coordinator.process_response(response_for(request_id, 200)).await);
        let relayed = waiter.await.unwrap().unwrap();

        assert_eq!(relayed.response.http_status_code, 200);
        assert!(relayed.response.body_content.is_none());
        assert!(matches!(relayed.body, ResponseBody::Empty));
        assert!(coordinator.is_empty());
    }

    #[tokio::test]
    async fn test_response_before_registration() {
        let (coordinator, _) = coordinator();
        let request_id = Uuid::new_v4();

        assert!(coordinator.process_response(response_for(request_id, 201)).await);
        let _guard = coordinator.register_request(request_id);
        let relayed = coordinator
            .get_response(request_id, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(relayed.response.http_status_code, 201);
    }

    #[tokio::test]
    async fn test_second_response_is_discarded() {
        let (coordinator, _) = coordinator();
        let request_id = Uuid::new_v4();
        let _guard = coordinator.register_request(request_id);

        assert!(coordinator.process_response(response_for(request_id, 200)).await);
        assert!(!coordinator.process_response(response_for(request_id, 500)).await);

        let relayed = coordinator
            .get_response(request_id, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(relayed.response.http_status_code, 200);
    }

    #[tokio::test]
    async fn test_cancellation_removes_state() {
        let (coordinator, _) = coordinator();
        let request_id = Uuid::new_v4();
        let _guard = coordinator.register_request(request_id);
        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let result = coordinator.get_response(request_id, &cancellation).await;

        assert!(matches!(result, Err(RelayError::Cancelled(id)) if id == request_id));
        assert!(!coordinator.contains(request_id));
    }

    #[tokio::test]
    async fn test_guard_drop_discards_state() {
        let (coordinator, _) = coordinator();
        let request_id = Uuid::new_v4();
        {
            let _guard = coordinator.register_request(request_id);
            assert!(coordinator.contains(request_id));
        }
        assert!(!coordinator.contains(request_id));
    }

    #[tokio::test]
    async fn test_unregistered_request() {
        let (coordinator, _) = coordinator();
        let result = coordinator
            .get_response(Uuid::new_v4(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(RelayError::NotRegistered(_))));
    }

    #[tokio::test]
    async fn test_outsourced_body_is_streamed_then_removed() {
        let (coordinator, store) = coordinator();
        let request_id = Uuid::new_v4();
        let payload = vec![7u8; 204_800];
        store
            .store_response_body(request_id, Box::new(Cursor::new(payload.clone())))
            .await
            .unwrap();

        let _guard = coordinator.register_request(request_id);
        let mut response = response_for(request_id, 200);
        response.body_size = Some(payload.len() as u64);
        coordinator.process_response(response).await;

        let relayed = coordinator
            .get_response(request_id, &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(relayed.body, ResponseBody::Outsourced(_)));
        let body = relayed.body.into_bytes().await.unwrap();
        assert_eq!(body.len(), payload.len());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!store.contains(BodyKind::Response, request_id));
    }

    #[tokio::test]
    async fn test_remove_expired() {
        let (coordinator, _) = coordinator();
        let guard = coordinator.register_request(Uuid::new_v4());
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(coordinator.remove_expired(Duration::from_millis(10)).await, 1);
        drop(guard);
        assert!(coordinator.is_empty());
    }

    #[tokio::test]
    async fn test_late_response_after_abandon_is_discarded() {
        let (coordinator, store) = coordinator();
        let request_id = Uuid::new_v4();
        drop(coordinator.register_request(request_id));

        store
            .store_response_body(request_id, Box::new(Cursor::new(vec![3u8; 100_000])))
            .await
            .unwrap();
        let mut response = response_for(request_id, 200);
        response.body_size = Some(100_000);

        assert!(!coordinator.process_response(response).await);
        assert!(coordinator.is_empty());
        assert!(!store.contains(BodyKind::Response, request_id));
    }

    #[tokio::test]
    async fn test_late_response_after_cancel_is_discarded() {
        let (coordinator, _) = coordinator();
        let request_id = Uuid::new_v4();
        let _guard = coordinator.register_request(request_id);
        let cancellation = CancellationToken::new();
        cancellation.cancel();
        let _ = coordinator.get_response(request_id, &cancellation).await;

        assert!(!coordinator.process_response(response_for(request_id, 200)).await);
        assert!(!coordinator.contains(request_id));
    }

    #[tokio::test]
    async fn test_expired_unconsumed_response_body_is_removed() {
        let (coordinator, store) = coordinator();
        let request_id = Uuid::new_v4();
        store
            .store_response_body(request_id, Box::new(Cursor::new(vec![5u8; 100_000])))
            .await
            .unwrap();
        let mut response = response_for(request_id, 200);
        response.body_size = Some(100_000);

        // Response without a registered caller leaves an orphaned state.
        assert!(coordinator.process_response(response).await);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(coordinator.remove_expired(Duration::from_millis(10)).await, 1);
        assert!(coordinator.is_empty());
        assert!(!store.contains(BodyKind::Response, request_id));
    }
}
