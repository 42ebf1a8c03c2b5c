use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Processing state of a captured invoice image.
///
/// Transitions: `Ready -> OcrRunning -> {OcrDone | OcrError}` and
/// `OcrDone -> AnalysisRunning -> {AnalysisDone | AnalysisError}`.
/// Error states are recoverable through an explicit user retry; nothing
/// leaves `AnalysisDone` or an error state automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageStatus {
    Ready,
    OcrRunning,
    OcrDone,
    OcrError,
    AnalysisRunning,
    AnalysisDone,
    AnalysisError,
}

impl ImageStatus {
    /// True while a scan or analysis request is awaiting confirmation.
    pub fn is_running(&self) -> bool {
        matches!(self, ImageStatus::OcrRunning | ImageStatus::AnalysisRunning)
    }

    /// States from which a user may start (or restart) OCR.
    pub fn can_start_scan(&self) -> bool {
        matches!(
            self,
            ImageStatus::Ready | ImageStatus::OcrError | ImageStatus::OcrDone
        )
    }

    /// States from which a user may start (or redo) analysis.
    pub fn can_start_analysis(&self) -> bool {
        matches!(
            self,
            ImageStatus::OcrDone | ImageStatus::AnalysisError | ImageStatus::AnalysisDone
        )
    }
}

/// Structured extraction result produced by the analysis service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceAnalysis {
    pub merchant: Option<String>,
    pub total_amount: Option<f64>,
    pub currency: Option<String>,
    pub date: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub taxes: Option<f64>,
    /// Whether the backend believes the image actually shows an invoice.
    /// A correctly analyzed non-invoice is still a successful analysis;
    /// this flag only changes how the result is labelled.
    #[serde(default)]
    pub is_invoice_confirmed: bool,
}

/// One row per captured invoice image within a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    /// Stable identity, unique within a project.
    pub id: String,
    /// Location of the binary in object storage. Absent while an
    /// optimistic upload has not stored the blob yet.
    pub storage_path: Option<String>,
    /// Last-known resolvable URL. Derived, may expire.
    pub display_url: Option<String>,
    pub status: ImageStatus,
    pub ocr_text: Option<String>,
    pub analysis: Option<InvoiceAnalysis>,
    /// Human-readable message carried with the error states.
    pub error_message: Option<String>,
    /// Timestamp of the last processing step, stamped locally when an
    /// operation starts or completes and confirmed by the server. Also
    /// the authority marker for conflict resolution in the registry.
    pub last_processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ImageRecord {
    /// Fresh optimistic record for a just-requested upload.
    pub fn pending_upload() -> Self {
        ImageRecord {
            id: Uuid::new_v4().to_string(),
            storage_path: None,
            display_url: None,
            status: ImageStatus::Ready,
            ocr_text: None,
            analysis: None,
            error_message: None,
            last_processed_at: None,
            created_at: Utc::now(),
        }
    }

    /// Authority marker used by the registry to ignore stale updates.
    /// Records that never went through a processing step sort oldest.
    pub fn authority(&self) -> DateTime<Utc> {
        self.last_processed_at.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn with_status(&self, status: ImageStatus) -> Self {
        let mut next = self.clone();
        next.status = status;
        next.error_message = None;
        // An analysis payload only accompanies AnalysisDone; a redo that
        // leaves that state drops the stale result.
        if status != ImageStatus::AnalysisDone {
            next.analysis = None;
        }
        next
    }

    pub fn with_error(&self, status: ImageStatus, message: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.status = status;
        next.error_message = Some(message.into());
        if status != ImageStatus::AnalysisDone {
            next.analysis = None;
        }
        next
    }
}

/// Upload request as handed over by the UI layer.
#[derive(Debug, Clone, Validate)]
pub struct NewImageUpload {
    #[validate(length(min = 1, max = 255))]
    pub file_name: String,
    #[validate(length(min = 1))]
    pub bytes: Vec<u8>,
}

impl NewImageUpload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        NewImageUpload {
            file_name: file_name.into(),
            bytes,
        }
    }
}
