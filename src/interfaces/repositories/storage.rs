use std::time::Duration;

use async_trait::async_trait;

use crate::errors::SyncError;

/// Binary blob store for captured invoice images. Backed by a cloud
/// object store or a database-attached blob store; opaque to the core.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores the payload and returns the authoritative storage path.
    async fn upload_binary(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, SyncError>;

    async fn delete_file(&self, path: &str) -> Result<(), SyncError>;

    /// Resolvable (possibly expiring) URL for display purposes.
    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, SyncError>;

    /// Reads a stored blob back, needed to feed image bytes into OCR.
    async fn fetch_binary(&self, path: &str) -> Result<Vec<u8>, SyncError>;
}
