//! In-memory body store (default, single instance).

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::io::Cursor;
use tokio::io::AsyncReadExt;
use uuid::Uuid;

use crate::body_store::{BodyKind, BodyOperation, BodyReader, BodyStore, BodyStoreError};

/// Bodies held in a concurrent map.
///
/// A body only becomes visible once its stream was read to the end, so a
/// dropped or failed write leaves nothing behind.
#[derive(Debug, Default)]
pub struct MemoryBodyStore {
    bodies: DashMap<(BodyKind, Uuid), Bytes>,
}

impl MemoryBodyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored bodies across both namespaces.
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn contains(&self, kind: BodyKind, request_id: Uuid) -> bool {
        self.bodies.contains_key(&(kind, request_id))
    }
}

#[async_trait]
impl BodyStore for MemoryBodyStore {
    async fn store_body(
        &self,
        kind: BodyKind,
        request_id: Uuid,
        mut body: BodyReader,
    ) -> Result<u64, BodyStoreError> {
        let mut buffer = Vec::new();
        body.read_to_end(&mut buffer)
            .await
            .map_err(|e| BodyStoreError::io(BodyOperation::Write, kind, request_id, e))?;

        let length = buffer.len() as u64;
        self.bodies.insert((kind, request_id), Bytes::from(buffer));
        tracing::debug!(kind = %kind, request_id = %request_id, length, "Stored body in memory");
        Ok(length)
    }

    async fn open_body(&self, kind: BodyKind, request_id: Uuid) -> Result<BodyReader, BodyStoreError> {
        let bytes = self
            .bodies
            .get(&(kind, request_id))
            .map(|entry| entry.value().clone())
            .ok_or(BodyStoreError::NotFound { kind, request_id })?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    async fn remove_body(&self, kind: BodyKind, request_id: Uuid) -> Result<(), BodyStoreError> {
        if self.bodies.remove(&(kind, request_id)).is_some() {
            tracing::debug!(kind = %kind, request_id = %request_id, "Removed body from memory");
        }
        Ok(())
    }
}
