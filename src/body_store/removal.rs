//! Scoped body removal.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use uuid::Uuid;

use crate::body_store::{BodyKind, BodyReader, BodyStore, BodyStoreError};

/// Guarantees removal of a stored body when the owning scope ends.
///
/// Call [`BodyRemoval::remove`] to remove and observe the result; otherwise the
/// body is removed in the background when the guard is dropped.
pub struct BodyRemoval {
    store: Arc<dyn BodyStore>,
    kind: BodyKind,
    request_id: Uuid,
    armed: bool,
}

impl BodyRemoval {
    pub fn new(store: Arc<dyn BodyStore>, kind: BodyKind, request_id: Uuid) -> Self {
        Self {
            store,
            kind,
            request_id,
            armed: true,
        }
    }

    pub fn request(store: Arc<dyn BodyStore>, request_id: Uuid) -> Self {
        Self::new(store, BodyKind::Request, request_id)
    }

    pub fn response(store: Arc<dyn BodyStore>, request_id: Uuid) -> Self {
        Self::new(store, BodyKind::Response, request_id)
    }

    /// Remove now. Idempotent with the removal on drop.
    pub async fn remove(mut self) -> Result<(), BodyStoreError> {
        self.armed = false;
        self.store.remove_body(self.kind, self.request_id).await
    }

    /// Keep the body; ownership passed elsewhere.
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for BodyRemoval {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let store = self.store.clone();
        let kind = self.kind;
        let request_id = self.request_id;

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = store.remove_body(kind, request_id).await {
                        tracing::warn!(kind = %kind, request_id = %request_id, error = %e, "Scoped body removal failed");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(kind = %kind, request_id = %request_id, "No runtime available, body not removed");
            }
        }
    }
}

/// A body reader that removes its store entry once dropped.
pub struct RemovingReader {
    inner: BodyReader,
    _removal: BodyRemoval,
}

impl RemovingReader {
    pub fn new(inner: BodyReader, removal: BodyRemoval) -> Self {
        Self {
            inner,
            _removal: removal,
        }
    }
}

impl AsyncRead for RemovingReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body_store::MemoryBodyStore;
    use std::io::Cursor;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    async fn stored(store: &Arc<MemoryBodyStore>, kind: BodyKind) -> Uuid {
        let id = Uuid::new_v4();
        store
            .store_body(kind, id, Box::new(Cursor::new(vec![1u8; 32])))
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_removed_on_drop() {
        let store = Arc::new(MemoryBodyStore::new());
        let id = stored(&store, BodyKind::Request).await;

        drop(BodyRemoval::request(store.clone(), id));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!store.contains(BodyKind::Request, id));
    }

    #[tokio::test]
    async fn test_disarmed_keeps_body() {
        let store = Arc::new(MemoryBodyStore::new());
        let id = stored(&store, BodyKind::Request).await;

        let mut removal = BodyRemoval::request(store.clone(), id);
        removal.disarm();
        drop(removal);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(store.contains(BodyKind::Request, id));
    }

    #[tokio::test]
    async fn test_removing_reader() {
        let store = Arc::new(MemoryBodyStore::new());
        let id = stored(&store, BodyKind::Response).await;

        let reader = store.open_response_body(id).await.unwrap();
        let mut reader = RemovingReader::new(reader, BodyRemoval::response(store.clone(), id));
        let mut content = Vec::new();
        reader.read_to_end(&mut content).await.unwrap();
        assert_eq!(content.len(), 32);
        assert!(store.contains(BodyKind::Response, id));

        drop(reader);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!store.contains(BodyKind::Response, id));
    }
}
