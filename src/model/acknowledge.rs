//! Acknowledgement of a relayed request.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::OriginId;

/// Confirms that a connector received (or finished) a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgeRequest {
    pub request_id: Uuid,
    /// Instance holding the acknowledge state for the request.
    pub origin_id: OriginId,
    /// Drop the outsourced request body once acknowledged.
    #[serde(default)]
    pub remove_request_body_content: bool,
}
