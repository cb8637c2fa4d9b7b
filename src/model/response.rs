//! Response produced by a connector for a relayed request.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{body, ClientRequest, HttpHeaders, OriginId};

/// Target response, correlated back to the waiting caller by request id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetResponse {
    pub request_id: Uuid,
    pub request_origin_id: OriginId,
    pub http_status_code: u16,
    #[serde(default)]
    pub http_headers: HttpHeaders,
    #[serde(default)]
    pub body_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "body")]
    pub body_content: Option<Bytes>,
    /// When the connector started executing the request (unix millis).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_start: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_duration_ms: Option<u64>,
    /// The connector could not reach the target.
    #[serde(default)]
    pub request_failed: bool,
}

impl TargetResponse {
    /// Create an empty response for a request.
    pub fn for_request(request: &ClientRequest, http_status_code: u16) -> Self {
        Self {
            request_id: request.request_id,
            request_origin_id: request.request_origin_id,
            http_status_code,
            http_headers: HttpHeaders::new(),
            body_size: None,
            body_content: None,
            request_start: None,
            request_duration_ms: None,
            request_failed: false,
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
    fn test_response_payload() {
        let request = ClientRequest::new("acme", "api", OriginId::new());
        let mut response = TargetResponse::for_request(&request, 200);
        response.body_size = Some(0);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["requestId"], request.request_id.to_string());
        assert_eq!(json["requestOriginId"], request.request_origin_id.to_string());
        assert_eq!(json["httpStatusCode"], 200);
        assert_eq!(json["bodySize"], 0);
        assert!(!response.is_body_outsourced());
    }
}
