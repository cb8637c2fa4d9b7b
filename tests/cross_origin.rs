//! Two relay instances sharing a broker: the caller waits on one instance
//! while the connector is attached to the other.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use relay_server::body_store::{BodyStore, MemoryBodyStore};
use relay_server::config::RelaySettings;
use relay_server::connector::ConnectionId;
use relay_server::model::{AcknowledgeRequest, ClientRequest, TargetResponse};
use relay_server::statistics::MemoryStatistics;
use relay_server::transport::broker::{requests_queue, MemoryBroker};
use relay_server::transport::in_process::InProcessConnectorTransports;
use relay_server::{RelayCore, TransportBackend};

mod common;
use common::eventually;

struct Instance {
    core: Arc<RelayCore>,
    transports: Arc<InProcessConnectorTransports>,
}

impl Instance {
    async fn start(broker: &Arc<MemoryBroker>, body_store: Arc<dyn BodyStore>) -> Self {
        let transports = Arc::new(InProcessConnectorTransports::new());
        let core = RelayCore::start(
            RelaySettings::default(),
            TransportBackend::Broker(broker.clone()),
            body_store,
            Arc::new(MemoryStatistics::new()),
            transports.clone(),
        )
        .await
        .unwrap();
        Self {
            core: Arc::new(core),
            transports,
        }
    }

    async fn attach_connector(&self, tenant: &str) -> UnboundedReceiver<ClientRequest> {
        let connection_id = ConnectionId::new();
        let receiver = self.transports.attach(&connection_id);
        self.core.connectors().register(connection_id, tenant, None).await.unwrap();
        receiver
    }
}

async fn receive(connector: &mut UnboundedReceiver<ClientRequest>) -> ClientRequest {
    tokio::time::timeout(Duration::from_secs(5), connector.recv())
        .await
        .expect("no request within 5s")
        .expect("connector channel closed")
}

#[tokio::test]
async fn test_response_returns_to_requesting_instance() {
    let broker = MemoryBroker::new();
    let store: Arc<dyn BodyStore> = Arc::new(MemoryBodyStore::new());
    let a = Instance::start(&broker, store.clone()).await;
    let b = Instance::start(&broker, store).await;

    let request = ClientRequest::new("acme", "api", a.core.origin_id());
    let request_id = request.request_id;
    let _waiting = a.core.responses().register_request(request_id);
    a.core.requests().process_request(request, Bytes::new()).await.unwrap();

    // Queued until a connector for the tenant shows up anywhere.
    assert_eq!(broker.pending(&requests_queue("acme")), 1);

    let mut connector = b.attach_connector("acme").await;
    let received = receive(&mut connector).await;
    assert_eq!(received.request_id, request_id);
    assert_eq!(received.request_origin_id, a.core.origin_id());
    assert_eq!(received.acknowledge_origin_id, Some(b.core.origin_id()));
    assert_eq!(broker.pending(&requests_queue("acme")), 0);

    let mut response = TargetResponse::for_request(&received, 200);
    response.body_content = Some(Bytes::from_static(b"pong"));
    response.body_size = Some(4);
    b.core.response_dispatcher().dispatch(response).await.unwrap();

    let relayed = tokio::time::timeout(
        Duration::from_secs(5),
        a.core.responses().get_response(request_id, &CancellationToken::new()),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(relayed.response.http_status_code, 200);
    assert_eq!(relayed.body.into_bytes().await.unwrap(), Bytes::from_static(b"pong"));
}

#[tokio::test]
async fn test_acknowledge_routes_to_consuming_instance() {
    let broker = MemoryBroker::new();
    let store: Arc<dyn BodyStore> = Arc::new(MemoryBodyStore::new());
    let a = Instance::start(&broker, store.clone()).await;
    let b = Instance::start(&broker, store).await;
    let mut connector = b.attach_connector("acme").await;

    let request = ClientRequest::new("acme", "api", a.core.origin_id());
    a.core.requests().process_request(request, Bytes::new()).await.unwrap();
    let received = receive(&mut connector).await;

    let core = b.core.clone();
    let request_id = received.request_id;
    eventually(move || {
        let core = core.clone();
        async move { core.acknowledges().contains(request_id) }
    })
    .await;
    assert_eq!(broker.unacked(), 1);

    // Sent from the instance the connector is not attached to.
    a.core
        .acknowledge_dispatcher()
        .dispatch(AcknowledgeRequest {
            request_id,
            origin_id: b.core.origin_id(),
            remove_request_body_content: false,
        })
        .await
        .unwrap();

    let broker_ref = broker.clone();
    let core = b.core.clone();
    eventually(move || {
        let broker = broker_ref.clone();
        let core = core.clone();
        async move { broker.unacked() == 0 && core.acknowledges().is_empty() }
    })
    .await;
}

#[tokio::test]
async fn test_outsourced_body_visible_to_consuming_instance() {
    let broker = MemoryBroker::new();
    let store: Arc<dyn BodyStore> = Arc::new(MemoryBodyStore::new());
    let a = Instance::start(&broker, store.clone()).await;
    let b = Instance::start(&broker, store.clone()).await;
    let mut connector = b.attach_connector("acme").await;

    let body = Bytes::from(vec![42u8; 204_800]);
    let request = ClientRequest::new("acme", "api", a.core.origin_id());
    a.core.requests().process_request(request, body.clone()).await.unwrap();

    let received = receive(&mut connector).await;
    assert_eq!(received.body_size, Some(204_800));
    assert!(received.body_content.is_none());

    let mut reader = store.open_request_body(received.request_id).await.unwrap();
    let mut stored = Vec::new();
    reader.read_to_end(&mut stored).await.unwrap();
    assert_eq!(Bytes::from(stored), body);
}

#[tokio::test]
async fn test_recovery_prunes_acknowledge_state_and_redelivers() {
    let broker = MemoryBroker::new();
    let store: Arc<dyn BodyStore> = Arc::new(MemoryBodyStore::new());
    let a = Instance::start(&broker, store.clone()).await;
    let b = Instance::start(&broker, store).await;
    let mut connector = b.attach_connector("acme").await;

    let request = ClientRequest::new("acme", "api", a.core.origin_id());
    a.core.requests().process_request(request, Bytes::new()).await.unwrap();
    let first = receive(&mut connector).await;

    let core = b.core.clone();
    let request_id = first.request_id;
    eventually(move || {
        let core = core.clone();
        async move { core.acknowledges().contains(request_id) }
    })
    .await;

    b.core.broker_consumer().unwrap().recover().await;

    // The redelivery registers a fresh token before reaching the connector.
    let again = receive(&mut connector).await;
    assert_eq!(again.request_id, request_id);
    assert_eq!(broker.unacked(), 1);

    b.core
        .acknowledge_dispatcher()
        .dispatch(AcknowledgeRequest {
            request_id,
            origin_id: b.core.origin_id(),
            remove_request_body_content: false,
        })
        .await
        .unwrap();
    assert_eq!(broker.unacked(), 0);
}
