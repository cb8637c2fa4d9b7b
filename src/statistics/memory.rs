//! In-memory statistics sink.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::connector::ConnectionId;
use crate::model::{unix_millis, Origin, OriginId};
use crate::statistics::{ConnectionInfo, StatisticsWriter};

/// Connection history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub info: ConnectionInfo,
    /// Unix millis, set when the connection closed.
    pub disconnected_at: Option<u64>,
}

/// Keeps statistics in concurrent maps, for development and tests.
#[derive(Debug, Default)]
pub struct MemoryStatistics {
    connections: DashMap<ConnectionId, ConnectionRecord>,
    origins: DashMap<OriginId, Origin>,
}

impl MemoryStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection(&self, connection_id: &ConnectionId) -> Option<ConnectionRecord> {
        self.connections.get(connection_id).map(|r| r.value().clone())
    }

    pub fn origin(&self, origin_id: OriginId) -> Option<Origin> {
        self.origins.get(&origin_id).map(|r| r.value().clone())
    }

    /// Connections opened and not yet closed.
    pub fn open_connections(&self) -> usize {
        self.connections
            .iter()
            .filter(|r| r.value().disconnected_at.is_none())
            .count()
    }
}

#[async_trait]
impl StatisticsWriter for MemoryStatistics {
    async fn set_connection_opened(&self, connection: &ConnectionInfo) {
        self.connections.insert(
            connection.connection_id.clone(),
            ConnectionRecord {
                info: connection.clone(),
                disconnected_at: None,
            },
        );
    }

    async fn set_connection_closed(&self, connection_id: &ConnectionId) {
        match self.connections.get_mut(connection_id) {
            Some(mut record) => record.disconnected_at = Some(unix_millis()),
            None => tracing::debug!(connection_id = %connection_id, "Closing unrecorded connection"),
        }
    }

    async fn set_origin_started(&self, origin: &Origin) {
        self.origins.insert(origin.id, origin.clone());
    }

    async fn update_origin_last_seen(&self, origin_id: OriginId) {
        if let Some(mut origin) = self.origins.get_mut(&origin_id) {
            origin.last_seen_at = unix_millis();
        }
    }

    async fn set_origin_shutdown(&self, origin_id: OriginId) {
        if let Some(mut origin) = self.origins.get_mut(&origin_id) {
            let now = unix_millis();
            origin.last_seen_at = now;
            origin.shutdown_at = Some(now);
        }
    }
}
