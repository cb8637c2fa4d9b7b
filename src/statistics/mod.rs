//! Connection and origin statistics.
//!
//! Persistence is a collaborator concern; the core only writes through
//! [`StatisticsWriter`] and never reads back.

pub mod memory;

pub use memory::MemoryStatistics;

use async_trait::async_trait;
use std::net::SocketAddr;

use crate::connector::ConnectionId;
use crate::model::{Origin, OriginId};

/// A connector connection as recorded when it opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub connection_id: ConnectionId,
    pub tenant_name: String,
    pub origin_id: OriginId,
    pub remote_address: Option<SocketAddr>,
    /// Unix millis.
    pub connected_at: u64,
}

/// Write-only sink for connection and origin lifecycle events.
#[async_trait]
pub trait StatisticsWriter: Send + Sync {
    async fn set_connection_opened(&self, connection: &ConnectionInfo);

    async fn set_connection_closed(&self, connection_id: &ConnectionId);

    async fn set_origin_started(&self, origin: &Origin);

    async fn update_origin_last_seen(&self, origin_id: OriginId);

    async fn set_origin_shutdown(&self, origin_id: OriginId);
}
