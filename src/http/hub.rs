//! Connector hub.
//!
//! # Responsibilities
//! - Accept connector WebSocket connections per tenant
//! - Register each connection with the connector registry and unregister it on close
//! - Send requests to connectors as JSON frames
//! - Route acknowledge and response frames to the dispatchers
//!
//! # Data Flow
//! ```text
//! GET /connector/{tenant} (upgrade)
//!     → ConnectorRegistry::register
//!     → loop:
//!         outgoing: HubConnectorTransport → {"type":"request",...}
//!         incoming: {"type":"acknowledge",...} → AcknowledgeDispatcher
//!                   {"type":"response",...}    → ResponseDispatcher
//!     → ConnectorRegistry::unregister
//! ```

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::connector::ConnectionId;
use crate::http::AppState;
use crate::model::{AcknowledgeRequest, ClientRequest, TargetResponse};
use crate::transport::{ConnectorTransport, ConnectorTransportFactory, TransportError};

/// Frames exchanged with connectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HubMessage {
    Request { request: ClientRequest },
    Acknowledge { acknowledge: AcknowledgeRequest },
    Response { response: TargetResponse },
}

/// Outgoing frame queues of the connected sockets.
#[derive(Default)]
pub struct ConnectorHub {
    connections: DashMap<ConnectionId, mpsc::UnboundedSender<HubMessage>>,
}

impl ConnectorHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn open(&self, connection_id: &ConnectionId) -> mpsc::UnboundedReceiver<HubMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.connections.insert(connection_id.clone(), sender);
        receiver
    }

    fn close(&self, connection_id: &ConnectionId) {
        self.connections.remove(connection_id);
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl ConnectorTransportFactory for ConnectorHub {
    fn create(&self, connection_id: &ConnectionId) -> Arc<dyn ConnectorTransport> {
        let sender = self.connections.get(connection_id).map(|s| s.value().clone());
        Arc::new(HubConnectorTransport {
            connection_id: connection_id.clone(),
            sender: Mutex::new(sender),
        })
    }
}

struct HubConnectorTransport {
    connection_id: ConnectionId,
    sender: Mutex<Option<mpsc::UnboundedSender<HubMessage>>>,
}

#[async_trait]
impl ConnectorTransport for HubConnectorTransport {
    async fn transport_request(&self, request: ClientRequest) -> Result<(), TransportError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        sender
            .ok_or_else(|| TransportError::ConnectionClosed(self.connection_id.to_string()))?
            .send(HubMessage::Request { request })
            .map_err(|_| TransportError::ConnectionClosed(self.connection_id.to_string()))
    }

    async fn dispose(&self) {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }
}

pub async fn connector_handler(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    ConnectInfo(remote_address): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(tenant) = state.tenants.find(&tenant) else {
        tracing::warn!(tenant = %tenant, remote_address = %remote_address, "Connector for unknown tenant");
        return (StatusCode::NOT_FOUND, "Unknown tenant").into_response();
    };

    ws.on_upgrade(move |socket| connector_session(state, tenant.name, remote_address, socket))
}

async fn connector_session(state: AppState, tenant: String, remote_address: SocketAddr, mut socket: WebSocket) {
    let connection_id = ConnectionId::new();
    let mut outgoing = state.hub.open(&connection_id);

    if let Err(e) = state
        .core
        .connectors()
        .register(connection_id.clone(), &tenant, Some(remote_address))
        .await
    {
        tracing::error!(connection_id = %connection_id, tenant = %tenant, error = %e, "Connector registration failed");
        state.hub.close(&connection_id);
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    loop {
        tokio::select! {
            frame = outgoing.recv() => {
                let Some(frame) = frame else { break };
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(connection_id = %connection_id, error = %e, "Failed to encode frame");
                        continue;
                    }
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => handle_frame(&state, &connection_id, text.as_str()).await,
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = socket.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(connection_id = %connection_id, error = %e, "Connector socket error");
                        break;
                    }
                }
            }
            _ = state.shutdown.cancelled() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
        }
    }

    state.hub.close(&connection_id);
    state.core.connectors().unregister(&connection_id).await;
}

async fn handle_frame(state: &AppState, connection_id: &ConnectionId, text: &str) {
    let frame: HubMessage = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(connection_id = %connection_id, error = %e, "Ignoring malformed connector frame");
            return;
        }
    };

    match frame {
        HubMessage::Acknowledge { acknowledge } => {
            let request_id = acknowledge.request_id;
            if let Err(e) = state.core.acknowledge_dispatcher().dispatch(acknowledge).await {
                tracing::warn!(connection_id = %connection_id, request_id = %request_id, error = %e, "Acknowledge dispatch failed");
            }
        }
        HubMessage::Response { response } => {
            let request_id = response.request_id;
            if let Err(e) = state.core.response_dispatcher().dispatch(response).await {
                tracing::warn!(connection_id = %connection_id, request_id = %request_id, error = %e, "Response dispatch failed");
            }
        }
        HubMessage::Request { request } => {
            tracing::warn!(connection_id = %connection_id, request_id = %request.request_id, "Connector sent a request frame, ignoring");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OriginId;

    #[test]
    fn test_frame_shape() {
        let request = ClientRequest::new("acme", "api", OriginId::new());
        let json = serde_json::to_value(HubMessage::Request { request }).unwrap();
        assert_eq!(json["type"], "request");
        assert_eq!(json["request"]["tenantName"], "acme");

        let frame: HubMessage = serde_json::from_str(&format!(
            r#"{{"type":"acknowledge","acknowledge":{{"requestId":"{}","originId":"{}","removeRequestBodyContent":true}}}}"#,
            uuid::Uuid::new_v4(),
            uuid::Uuid::new_v4()
        ))
        .unwrap();
        assert!(matches!(frame, HubMessage::Acknowledge { acknowledge } if acknowledge.remove_request_body_content));
    }

    #[tokio::test]
    async fn test_transport_sends_request_frames() {
        let hub = ConnectorHub::new();
        let connection_id = ConnectionId::new();
        let mut outgoing = hub.open(&connection_id);
        let transport = hub.create(&connection_id);

        let request = ClientRequest::new("acme", "api", OriginId::new());
        transport.transport_request(request.clone()).await.unwrap();
        assert!(matches!(outgoing.recv().await, Some(HubMessage::Request { request: sent }) if sent.request_id == request.request_id));

        transport.dispose().await;
        assert!(transport.transport_request(request).await.is_err());
    }
}
