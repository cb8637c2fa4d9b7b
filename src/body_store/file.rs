//! File-backed body store.
//!
//! # Responsibilities
//! - Keep one ephemeral file per body under the configured storage path
//! - Validate create/read/write/delete permission at startup
//! - Write under a `.partial` name and rename once synced, so readers never
//!   observe an incomplete body
//! - Remove partially written files on failure or cancellation

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

use crate::body_store::{BodyKind, BodyOperation, BodyReader, BodyStore, BodyStoreError};

const REQUEST_FILE_PREFIX: &str = "request-body-";
const RESPONSE_FILE_PREFIX: &str = "response-body-";
const PARTIAL_SUFFIX: &str = ".partial";
const CHECK_CONTENT: &[u8] = b"relay-server storage check";

/// Bodies stored as files, shareable between instances through a common path.
#[derive(Debug, Clone)]
pub struct FileBodyStore {
    root: PathBuf,
}

impl FileBodyStore {
    /// Open the store, creating the directory and validating permissions.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, BodyStoreError> {
        let store = Self { root: root.into() };
        store.validate().await?;
        tracing::info!(path = %store.root.display(), "File body store ready");
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn path_for(&self, kind: BodyKind, request_id: Uuid) -> PathBuf {
        let prefix = match kind {
            BodyKind::Request => REQUEST_FILE_PREFIX,
            BodyKind::Response => RESPONSE_FILE_PREFIX,
        };
        self.root.join(format!("{}{}", prefix, request_id))
    }

    pub(crate) fn partial_path_for(&self, kind: BodyKind, request_id: Uuid) -> PathBuf {
        let mut path = self.path_for(kind, request_id).into_os_string();
        path.push(PARTIAL_SUFFIX);
        PathBuf::from(path)
    }

    async fn validate(&self) -> Result<(), BodyStoreError> {
        let storage_error = |source| BodyStoreError::StoragePath {
            path: self.root.clone(),
            source,
        };

        fs::create_dir_all(&self.root).await.map_err(storage_error)?;

        let check = self.root.join(format!(".check-{}", Uuid::new_v4()));
        fs::write(&check, CHECK_CONTENT).await.map_err(storage_error)?;
        let content = fs::read(&check).await.map_err(storage_error)?;
        fs::remove_file(&check).await.map_err(storage_error)?;

        if content != CHECK_CONTENT {
            return Err(storage_error(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "check file content mismatch",
            )));
        }
        Ok(())
    }
}

/// Deletes a file on drop unless committed.
struct PartialFile {
    path: Option<PathBuf>,
}

impl PartialFile {
    fn commit(&mut self) {
        self.path = None;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial body file");
                }
            } else {
                tracing::debug!(path = %path.display(), "Removed partial body file");
            }
        }
    }
}

#[async_trait]
impl BodyStore for FileBodyStore {
    async fn store_body(
        &self,
        kind: BodyKind,
        request_id: Uuid,
        mut body: BodyReader,
    ) -> Result<u64, BodyStoreError> {
        let path = self.path_for(kind, request_id);
        let partial_path = self.partial_path_for(kind, request_id);
        let failed = |e| BodyStoreError::io(BodyOperation::Write, kind, request_id, e);

        // Declared before the file so the handle closes before removal.
        let mut partial = PartialFile {
            path: Some(partial_path.clone()),
        };
        let mut file = File::create(&partial_path).await.map_err(failed)?;
        let length = tokio::io::copy(&mut body, &mut file).await.map_err(failed)?;
        file.flush().await.map_err(failed)?;
        file.sync_all().await.map_err(failed)?;
        drop(file);
        fs::rename(&partial_path, &path).await.map_err(failed)?;
        partial.commit();

        tracing::debug!(kind = %kind, request_id = %request_id, length, "Stored body on disk");
        Ok(length)
    }

    async fn open_body(&self, kind: BodyKind, request_id: Uuid) -> Result<BodyReader, BodyStoreError> {
        match File::open(self.path_for(kind, request_id)).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BodyStoreError::NotFound { kind, request_id })
            }
            Err(e) => Err(BodyStoreError::io(BodyOperation::Read, kind, request_id, e)),
        }
    }

    async fn remove_body(&self, kind: BodyKind, request_id: Uuid) -> Result<(), BodyStoreError> {
        match fs::remove_file(self.path_for(kind, request_id)).await {
            Ok(()) => {
                tracing::debug!(kind = %kind, request_id = %request_id, "Removed body file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BodyStoreError::io(BodyOperation::Delete, kind, request_id, e)),
        }
    }
}

/// Read an opened body to the end.
pub async fn read_to_vec(mut reader: BodyReader) -> std::io::Result<Vec<u8>> {
    let mut content = Vec::new();
    reader.read_to_end(&mut content).await?;
    Ok(content)
}
