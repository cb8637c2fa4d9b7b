//! Out-of-band body storage.
//!
//! # Data Flow
//! ```text
//! Request body > maximum_binary_size
//!     → store_request_body (message keeps only body_size)
//!     → connector fetches via open_request_body
//!     → removed on acknowledge or when the HTTP call ends
//!
//! Response body uploaded by connector
//!     → store_response_body
//!     → ResponseCoordinator opens it for the waiting caller
//!     → removed once streamed (RemovingReader)
//! ```
//!
//! # Design Decisions
//! - Entries are keyed by request id, with separate request/response namespaces
//! - A partially written entry never survives a failed or cancelled write
//! - Removal is idempotent

pub mod file;
pub mod memory;
pub mod removal;

pub use file::FileBodyStore;
pub use memory::MemoryBodyStore;
pub use removal::{BodyRemoval, RemovingReader};

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::AsyncRead;
use uuid::Uuid;

/// Readable body stream.
pub type BodyReader = Box<dyn AsyncRead + Send + Unpin>;

/// Namespace of a stored body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyKind {
    Request,
    Response,
}

impl std::fmt::Display for BodyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BodyKind::Request => write!(f, "request"),
            BodyKind::Response => write!(f, "response"),
        }
    }
}

/// Body store operation, for error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyOperation {
    Read,
    Write,
    Delete,
}

impl std::fmt::Display for BodyOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BodyOperation::Read => write!(f, "read"),
            BodyOperation::Write => write!(f, "write"),
            BodyOperation::Delete => write!(f, "delete"),
        }
    }
}

/// Errors raised by a body store.
#[derive(Debug, Error)]
pub enum BodyStoreError {
    /// No body stored under the request id.
    #[error("{kind} body for request {request_id} not found")]
    NotFound { kind: BodyKind, request_id: Uuid },

    /// I/O failure while reading, writing or deleting a body.
    #[error("failed to {operation} {kind} body for request {request_id}: {source}")]
    Io {
        operation: BodyOperation,
        kind: BodyKind,
        request_id: Uuid,
        #[source]
        source: std::io::Error,
    },

    /// The storage path failed startup validation.
    #[error("storage path {} is not usable: {source}", .path.display())]
    StoragePath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BodyStoreError {
    /// Log an I/O failure with its operation context and wrap it.
    pub(crate) fn io(
        operation: BodyOperation,
        kind: BodyKind,
        request_id: Uuid,
        source: std::io::Error,
    ) -> Self {
        tracing::error!(
            operation = %operation,
            kind = %kind,
            request_id = %request_id,
            error = %source,
            "Body store I/O failure"
        );
        BodyStoreError::Io {
            operation,
            kind,
            request_id,
            source,
        }
    }
}

/// Key-value storage for bodies too large to inline in a message.
#[async_trait]
pub trait BodyStore: Send + Sync {
    /// Consume the stream into the store. Returns the stored length.
    async fn store_body(
        &self,
        kind: BodyKind,
        request_id: Uuid,
        body: BodyReader,
    ) -> Result<u64, BodyStoreError>;

    /// Open a stored body for reading.
    async fn open_body(&self, kind: BodyKind, request_id: Uuid) -> Result<BodyReader, BodyStoreError>;

    /// Remove a stored body. Removing a missing body succeeds.
    async fn remove_body(&self, kind: BodyKind, request_id: Uuid) -> Result<(), BodyStoreError>;

    async fn store_request_body(&self, request_id: Uuid, body: BodyReader) -> Result<u64, BodyStoreError> {
        self.store_body(BodyKind::Request, request_id, body).await
    }

    async fn store_response_body(&self, request_id: Uuid, body: BodyReader) -> Result<u64, BodyStoreError> {
        self.store_body(BodyKind::Response, request_id, body).await
    }

    async fn open_request_body(&self, request_id: Uuid) -> Result<BodyReader, BodyStoreError> {
        self.open_body(BodyKind::Request, request_id).await
    }

    async fn open_response_body(&self, request_id: Uuid) -> Result<BodyReader, BodyStoreError> {
        self.open_body(BodyKind::Response, request_id).await
    }

    async fn remove_request_body(&self, request_id: Uuid) -> Result<(), BodyStoreError> {
        self.remove_body(BodyKind::Request, request_id).await
    }

    async fn remove_response_body(&self, request_id: Uuid) -> Result<(), BodyStoreError> {
        self.remove_body(BodyKind::Response, request_id).await
    }
}
