use async_trait::async_trait;

use crate::entities::image_record::{ImageRecord, InvoiceAnalysis};
use crate::errors::SyncError;

/// Metadata backend for image records. One capability interface replaces
/// the pile of per-vendor implementations the feature accumulated.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Persists a new record; returns the authoritative server copy.
    async fn create_record(
        &self,
        project_id: &str,
        record: &ImageRecord,
    ) -> Result<ImageRecord, SyncError>;

    async fn update_ocr(
        &self,
        project_id: &str,
        image_id: &str,
        ocr_text: &str,
    ) -> Result<(), SyncError>;

    async fn update_analysis(
        &self,
        project_id: &str,
        image_id: &str,
        analysis: &InvoiceAnalysis,
    ) -> Result<(), SyncError>;

    async fn delete_record(&self, project_id: &str, image_id: &str) -> Result<(), SyncError>;

    /// Full refetch, used for bulk reconciliation.
    async fn fetch_all(&self, project_id: &str) -> Result<Vec<ImageRecord>, SyncError>;
}
