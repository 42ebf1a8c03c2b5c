use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use tracing::{info, warn};
use validator::Validate;

use crate::entities::image_record::{ImageRecord, NewImageUpload};
use crate::errors::SyncError;
use crate::interfaces::repositories::backend::ImageBackend;
use crate::interfaces::repositories::codec::ImageCodec;
use crate::interfaces::repositories::storage::ObjectStorage;
use crate::use_cases::registry::ImageRegistry;

static SUPPORTED_IMAGE_TYPES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "image/jpeg",
        "image/png",
        "image/heif",
        "image/heic",
        "image/webp",
    ]
});

/// Serializes user-triggered mutations against both the registry
/// (optimistic) and the backend (authoritative), with compensating
/// rollback when a later step fails.
pub struct MutationCoordinator<S, B, C>
where
    S: ObjectStorage,
    B: ImageBackend,
    C: ImageCodec,
{
    registry: Arc<ImageRegistry>,
    storage: S,
    backend: B,
    codec: C,
    project_id: String,
    signed_url_ttl: Duration,
    max_upload_bytes: usize,
}

impl<S, B, C> MutationCoordinator<S, B, C>
where
    S: ObjectStorage,
    B: ImageBackend,
    C: ImageCodec,
{
    pub fn new(
        registry: Arc<ImageRegistry>,
        storage: S,
        backend: B,
        codec: C,
        project_id: impl Into<String>,
        signed_url_ttl: Duration,
        max_upload_bytes: usize,
    ) -> Self {
        MutationCoordinator {
            registry,
            storage,
            backend,
            codec,
            project_id: project_id.into(),
            signed_url_ttl,
            max_upload_bytes,
        }
    }

    /// Uploads a captured invoice image and registers its record.
    ///
    /// An optimistic `Ready` record appears immediately; any failure after
    /// the blob was stored cleans up the orphaned artifact, rolls the
    /// optimistic record back and surfaces one coherent error.
    pub async fn upload_image(&self, upload: NewImageUpload) -> Result<ImageRecord, SyncError> {
        upload.validate()?;
        if upload.bytes.len() > self.max_upload_bytes {
            return Err(SyncError::Validation(format!(
                "image exceeds the {} byte upload limit",
                self.max_upload_bytes
            )));
        }
        let content_type = sniff_image_type(&upload.bytes)?;

        let mut record = ImageRecord::pending_upload();
        self.registry.upsert(record.clone());

        match self.store_and_register(&mut record, upload, content_type).await {
            Ok(confirmed) => {
                self.registry.upsert(confirmed.clone());
                info!(image_id = %confirmed.id, "Image uploaded");
                Ok(confirmed)
            }
            Err(e) => {
                self.registry.remove(&record.id);
                if let Some(path) = record.storage_path.as_deref() {
                    // The metadata row was never created; drop the blob so
                    // nothing unreferenced lingers in storage.
                    if let Err(cleanup) = self.storage.delete_file(path).await {
                        warn!(path, "Failed to clean up orphaned upload: {}", cleanup);
                    }
                }
                Err(e)
            }
        }
    }

    /// Deletes an image after explicit user confirmation.
    ///
    /// Never optimistic: the registry keeps the record until the backend
    /// confirms, because losing the artifact silently is worse than a
    /// momentarily stale list.
    pub async fn delete_image(&self, image_id: &str, confirmed: bool) -> Result<(), SyncError> {
        if !confirmed {
            return Err(SyncError::ConfirmationRequired);
        }
        let record = self
            .registry
            .get(image_id)
            .ok_or_else(|| SyncError::NotFound(format!("image {}", image_id)))?;

        self.backend.delete_record(&self.project_id, image_id).await?;

        // Metadata is gone; an orphaned blob is tolerable, so this part is
        // best-effort only.
        if let Some(path) = record.storage_path.as_deref() {
            if let Err(e) = self.storage.delete_file(path).await {
                warn!(image_id, path, "Failed to delete stored binary: {}", e);
            }
        }

        self.registry.remove(image_id);
        info!(image_id, "Image deleted");
        Ok(())
    }

    /// Full refetch feeding bulk reconciliation, for manual refresh and
    /// for catching up after a long stream outage.
    pub async fn refresh(&self) -> Result<usize, SyncError> {
        let records = self.backend.fetch_all(&self.project_id).await?;
        let count = records.len();
        self.registry.replace_all(records);
        Ok(count)
    }

    async fn store_and_register(
        &self,
        record: &mut ImageRecord,
        upload: NewImageUpload,
        content_type: &'static str,
    ) -> Result<ImageRecord, SyncError> {
        let payload = self.codec.compress(upload.bytes, content_type).await?;

        let path = format!(
            "projects/{}/images/{}-{}",
            self.project_id, record.id, upload.file_name
        );
        let stored_path = self
            .storage
            .upload_binary(&path, payload, content_type)
            .await?;
        record.storage_path = Some(stored_path.clone());

        record.display_url = Some(
            self.storage
                .signed_url(&stored_path, self.signed_url_ttl)
                .await?,
        );

        self.backend.create_record(&self.project_id, record).await
    }
}

fn sniff_image_type(bytes: &[u8]) -> Result<&'static str, SyncError> {
    let kind = infer::get(bytes)
        .ok_or_else(|| SyncError::Validation("unrecognized file content".to_string()))?;
    let mime = kind.mime_type();
    SUPPORTED_IMAGE_TYPES
        .iter()
        .find(|supported| **supported == mime)
        .copied()
        .ok_or_else(|| SyncError::Validation(format!("unsupported content type {}", mime)))
}
