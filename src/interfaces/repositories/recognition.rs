use async_trait::async_trait;

use crate::entities::image_record::InvoiceAnalysis;
use crate::errors::SyncError;

/// Remote OCR and structured-extraction service, treated as a black box.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecognitionService: Send + Sync {
    /// Extracts raw text from an image. May legitimately return an empty
    /// string; the state machine treats that as an OCR failure.
    async fn detect_text(&self, image_bytes: Vec<u8>) -> Result<String, SyncError>;

    /// Structured extraction over previously produced OCR text.
    async fn analyze(&self, ocr_text: &str) -> Result<InvoiceAnalysis, SyncError>;
}
