use async_trait::async_trait;

use crate::errors::SyncError;

/// Image compression collaborator applied before upload to bound size and
/// dimensions. The algorithm is an external concern; the engine only ships
/// a passthrough implementation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageCodec: Send + Sync {
    async fn compress(&self, bytes: Vec<u8>, content_type: &str) -> Result<Vec<u8>, SyncError>;
}

#[derive(Debug, Clone, Default)]
pub struct PassthroughCodec;

#[async_trait]
impl ImageCodec for PassthroughCodec {
    async fn compress(&self, bytes: Vec<u8>, _content_type: &str) -> Result<Vec<u8>, SyncError> {
        Ok(bytes)
    }
}
