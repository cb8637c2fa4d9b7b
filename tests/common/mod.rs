//! Shared utilities for integration tests.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use relay_server::config::{RelayConfig, TenantConfig};
use relay_server::http::HubMessage;
use relay_server::model::AcknowledgeMode;
use relay_server::{RelayCore, RelayServer, Shutdown, TransportBackend};

pub type ConnectorSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A relay server listening on an ephemeral port.
pub struct TestRelay {
    pub addr: SocketAddr,
    pub core: Arc<RelayCore>,
    pub shutdown: Shutdown,
}

impl TestRelay {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Configuration with the given tenants using the default acknowledge mode.
pub fn config_with_tenants(tenants: &[&str]) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.tenants = tenants
        .iter()
        .map(|name| TenantConfig {
            name: name.to_string(),
            acknowledge_mode: Some(AcknowledgeMode::ConnectorReceived),
        })
        .collect();
    config
}

pub async fn start_relay(config: RelayConfig) -> TestRelay {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let server = RelayServer::new(config, TransportBackend::InProcess, shutdown.clone())
        .await
        .unwrap();
    let core = server.core().clone();
    tokio::spawn(server.run(listener));

    TestRelay { addr, core, shutdown }
}

/// Open a connector socket and wait until the relay registered it.
pub async fn connect_connector(relay: &TestRelay, tenant: &str) -> ConnectorSocket {
    let before = relay.core.connectors().tenant_connection_count(tenant);
    let (socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/connector/{}", relay.addr, tenant))
        .await
        .unwrap();

    let core = relay.core.clone();
    let tenant = tenant.to_string();
    eventually(move || {
        let core = core.clone();
        let tenant = tenant.clone();
        async move { core.connectors().tenant_connection_count(&tenant) > before }
    })
    .await;
    socket
}

pub async fn next_frame(socket: &mut ConnectorSocket) -> HubMessage {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("no frame within 5s")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

pub async fn send_frame(socket: &mut ConnectorSocket, frame: &HubMessage) {
    socket
        .send(Message::text(serde_json::to_string(frame).unwrap()))
        .await
        .unwrap();
}

/// Poll a condition until it holds, failing after 5 seconds.
pub async fn eventually<F, Fut>(condition: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition().await {
        assert!(tokio::time::Instant::now() < deadline, "condition not met within 5s");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
