//! Origin (server instance) identity.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::unix_millis;

/// Unique identifier of a running relay server instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OriginId(Uuid);

impl OriginId {
    /// Generate a fresh origin id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for OriginId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for OriginId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for OriginId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A running server process, used for cross-instance addressing and liveness cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Origin {
    pub id: OriginId,
    /// Startup time (unix millis).
    pub started_at: u64,
    /// Last heartbeat (unix millis).
    pub last_seen_at: u64,
    /// Set once the instance shut down cleanly.
    pub shutdown_at: Option<u64>,
}

impl Origin {
    /// Create the origin record for the current process.
    pub fn start() -> Self {
        let now = unix_millis();
        Self {
            id: OriginId::new(),
            started_at: now,
            last_seen_at: now,
            shutdown_at: None,
        }
    }
}
