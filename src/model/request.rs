//! Client request relayed to a connector.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::model::{body, unix_millis, OriginId};

/// HTTP headers with multi-value support.
pub type HttpHeaders = HashMap<String, Vec<String>>;

/// Policy controlling when a request counts as received for transport-level removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AcknowledgeMode {
    /// No acknowledgement; the transport removes the message on receipt.
    Disabled,
    /// Acknowledge once the connector received the request.
    #[default]
    #[serde(alias = "Auto")]
    ConnectorReceived,
    /// Acknowledge after the connector produced a response.
    ConnectorFinished,
    /// Acknowledged explicitly by the target's own code.
    Manual,
}

impl AcknowledgeMode {
    /// Whether an acknowledge state must be kept for this request.
    pub fn requires_acknowledge(&self) -> bool {
        *self != AcknowledgeMode::Disabled
    }
}

/// A request created at the HTTP boundary, immutable once dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRequest {
    pub request_id: Uuid,
    /// Instance holding the waiting HTTP call.
    pub request_origin_id: OriginId,
    /// Instance holding the acknowledge state, set by the consuming side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledge_origin_id: Option<OriginId>,
    pub tenant_name: String,
    pub target: String,
    pub http_method: String,
    pub url: String,
    #[serde(default)]
    pub http_headers: HttpHeaders,
    #[serde(default)]
    pub body_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "body")]
    pub body_content: Option<Bytes>,
    #[serde(default)]
    pub acknowledge_mode: AcknowledgeMode,
    #[serde(default)]
    pub enable_tracing: bool,
    /// Creation time (unix millis).
    #[serde(default)]
    pub created_at: u64,
}

impl ClientRequest {
    /// Create a request with a fresh request id.
    pub fn new(tenant_name: impl Into<String>, target: impl Into<String>, origin_id: OriginId) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            request_origin_id: origin_id,
            acknowledge_origin_id: None,
            tenant_name: tenant_name.into(),
            target: target.into(),
            http_method: "GET".to_string(),
            url: "/".to_string(),
            http_headers: HttpHeaders::new(),
            body_size: None,
            body_content: None,
            acknowledge_mode: AcknowledgeMode::default(),
            enable_tracing: false,
            created_at: unix_millis(),
        }
    }

    /// The body lives in the body store rather than in the message.
    pub fn is_body_outsourced(&self) -> bool {
        body::is_outsourced(self.body_size, &self.body_content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_field_names() {
        let mut request = ClientRequest::new("acme", "api", OriginId::new());
        request.body_size = Some(4);
        request.body_content = Some(Bytes::from_static(b"ping"));

        let json = serde_json::to_value(&request).unwrap();
        for field in [
            "requestId",
            "requestOriginId",
            "tenantName",
            "target",
            "httpMethod",
            "url",
            "httpHeaders",
            "bodySize",
            "acknowledgeMode",
            "enableTracing",
        ] {
            assert!(json.get(field).is_some(), "missing {}", field);
        }
        assert_eq!(json["bodyContent"], "cGluZw==");

        let decoded: ClientRequest = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_acknowledge_mode_auto_alias() {
        let mode: AcknowledgeMode = serde_json::from_str("\"Auto\"").unwrap();
        assert_eq!(mode, AcknowledgeMode::ConnectorReceived);
        assert!(mode.requires_acknowledge());
        assert!(!AcknowledgeMode::Disabled.requires_acknowledge());
    }

    #[test]
    fn test_outsourced_request_has_no_inline_body() {
        let mut request = ClientRequest::new("acme", "api", OriginId::new());
        request.body_size = Some(204_800);

        assert!(request.is_body_outsourced());
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["bodySize"], 204_800);
        assert!(json.get("bodyContent").is_none());
    }
}
