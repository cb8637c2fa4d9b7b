//! Response dispatch.

use std::sync::Arc;

use crate::coordination::ResponseCoordinator;
use crate::model::{OriginId, TargetResponse};
use crate::observability::metrics;
use crate::subscription::{handler, Subscription};
use crate::transport::{ServerTransport, TransportError};

/// Routes a connector's response to the origin waiting for it.
pub struct ResponseDispatcher {
    origin_id: OriginId,
    shortcut_enabled: bool,
    coordinator: Arc<ResponseCoordinator>,
    server_transport: Arc<dyn ServerTransport>,
    _subscription: Subscription,
}

impl ResponseDispatcher {
    /// Also subscribes the coordinator to responses arriving over the transport.
    pub fn new(
        origin_id: OriginId,
        shortcut_enabled: bool,
        coordinator: Arc<ResponseCoordinator>,
        server_transport: Arc<dyn ServerTransport>,
    ) -> Self {
        let target = coordinator.clone();
        let subscription = server_transport.subscribe_responses(handler(move |response: TargetResponse| {
            let target = target.clone();
            async move {
                target.process_response(response).await;
            }
        }));

        Self {
            origin_id,
            shortcut_enabled,
            coordinator,
            server_transport,
            _subscription: subscription,
        }
    }

    pub async fn dispatch(&self, response: TargetResponse) -> Result<(), TransportError> {
        if self.shortcut_enabled && response.request_origin_id == self.origin_id {
            tracing::debug!(request_id = %response.request_id, "Response shortcut to local coordinator");
            metrics::record_response_dispatched("shortcut");
            self.coordinator.process_response(response).await;
            return Ok(());
        }

        tracing::debug!(
            request_id = %response.request_id,
            origin_id = %response.request_origin_id,
            "Dispatching response through server transport"
        );
        metrics::record_response_dispatched("transport");
        self.server_transport.dispatch_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body_store::MemoryBodyStore;
    use crate::model::ClientRequest;
    use crate::transport::broker::{BrokerPublisher, BrokerServerTransport, MemoryBroker, MemoryChannel};
    use bytes::Bytes;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    async fn relay_once(response: TargetResponse, shortcut_enabled: bool) -> (TargetResponse, Bytes) {
        let broker = MemoryBroker::new();
        let origin_id = response.request_origin_id;
        let publisher = Arc::new(BrokerPublisher::new(MemoryChannel::open(&broker)));
        let server_transport = BrokerServerTransport::start(origin_id, publisher, MemoryChannel::open(&broker))
            .await
            .unwrap();
        let coordinator = Arc::new(ResponseCoordinator::new(Arc::new(MemoryBodyStore::new())));
        let dispatcher = ResponseDispatcher::new(origin_id, shortcut_enabled, coordinator.clone(), server_transport);

        let request_id = response.request_id;
        let _guard = coordinator.register_request(request_id);
        dispatcher.dispatch(response).await.unwrap();

        let relayed = tokio::time::timeout(
            Duration::from_secs(5),
            coordinator.get_response(request_id, &CancellationToken::new()),
        )
        .await
        .unwrap()
        .unwrap();
        let body = relayed.body.into_bytes().await.unwrap();
        (relayed.response, body)
    }

    #[tokio::test]
    async fn test_shortcut_and_transport_paths_agree() {
        let request = ClientRequest::new("acme", "api", OriginId::new());
        let mut response = TargetResponse::for_request(&request, 203);
        response
            .http_headers
            .insert("content-type".to_string(), vec!["application/json".to_string()]);
        response
            .http_headers
            .insert("set-cookie".to_string(), vec!["a=1".to_string(), "b=2".to_string()]);
        response.body_content = Some(Bytes::from_static(b"{\"ok\":true}"));
        response.body_size = Some(11);
        response.request_duration_ms = Some(12);

        let shortcut = relay_once(response.clone(), true).await;
        let transported = relay_once(response.clone(), false).await;

        assert_eq!(shortcut, transported);
        assert_eq!(shortcut.0, response);
        assert_eq!(shortcut.1, Bytes::from_static(b"{\"ok\":true}"));
    }
}
