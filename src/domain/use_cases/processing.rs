use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::entities::image_record::{ImageRecord, ImageStatus, InvoiceAnalysis};
use crate::errors::SyncError;
use crate::interfaces::repositories::backend::ImageBackend;
use crate::interfaces::repositories::recognition::RecognitionService;
use crate::interfaces::repositories::storage::ObjectStorage;
use crate::use_cases::registry::ImageRegistry;

/// Drives the per-image OCR/analysis state machine.
///
/// Entering a `*Running` state is an optimistic local transition set before
/// the network call goes out, so the UI shows progress immediately. The
/// authoritative outcome arrives either from the call itself or later via
/// the push channel; a fixed timeout forces the matching error state when
/// neither shows up.
pub struct ProcessingPipeline<R, S, B>
where
    R: RecognitionService,
    S: ObjectStorage,
    B: ImageBackend,
{
    registry: Arc<ImageRegistry>,
    recognition: R,
    storage: S,
    backend: B,
    project_id: String,
    operation_timeout: Duration,
    in_flight: DashMap<String, ()>,
}

impl<R, S, B> ProcessingPipeline<R, S, B>
where
    R: RecognitionService,
    S: ObjectStorage,
    B: ImageBackend,
{
    pub fn new(
        registry: Arc<ImageRegistry>,
        recognition: R,
        storage: S,
        backend: B,
        project_id: impl Into<String>,
        operation_timeout: Duration,
    ) -> Self {
        ProcessingPipeline {
            registry,
            recognition,
            storage,
            backend,
            project_id: project_id.into(),
            operation_timeout,
            in_flight: DashMap::new(),
        }
    }

    /// Runs OCR for the image. Legal from `Ready`, `OcrError` (retry) and
    /// `OcrDone` (re-scan); rejected while any operation is in flight.
    pub async fn scan(&self, image_id: &str) -> Result<(), SyncError> {
        let record = self.require(image_id)?;
        if record.status.is_running() {
            return Err(SyncError::OperationInFlight(image_id.to_string()));
        }
        if !record.status.can_start_scan() {
            return Err(SyncError::InvalidTransition(format!(
                "cannot scan image in state {:?}",
                record.status
            )));
        }
        let _guard = self.claim(image_id)?;

        self.registry
            .upsert(self.start_running(&record, ImageStatus::OcrRunning));
        info!(image_id, "OCR started");

        match timeout(self.operation_timeout, self.run_ocr(&record)).await {
            Err(_) => {
                let message = format!(
                    "OCR timed out after {}s",
                    self.operation_timeout.as_secs()
                );
                self.fail_if_running(image_id, ImageStatus::OcrRunning, ImageStatus::OcrError, &message);
                Err(SyncError::Timeout {
                    operation: "OCR",
                    window_secs: self.operation_timeout.as_secs(),
                })
            }
            Ok(Err(e)) => {
                self.fail_if_running(
                    image_id,
                    ImageStatus::OcrRunning,
                    ImageStatus::OcrError,
                    &e.to_string(),
                );
                Err(e)
            }
            Ok(Ok(text)) => {
                if text.trim().is_empty() {
                    let message = "OCR completed but detected no text";
                    self.fail_if_running(
                        image_id,
                        ImageStatus::OcrRunning,
                        ImageStatus::OcrError,
                        message,
                    );
                    return Err(SyncError::DataIntegrity(message.to_string()));
                }

                let confirmed = self.complete_ocr(image_id, &text);
                if confirmed {
                    info!(image_id, chars = text.len(), "OCR finished");
                    // Persistence lag is non-fatal; the next push frame or
                    // refresh reconciles the stored copy.
                    if let Err(e) = self
                        .backend
                        .update_ocr(&self.project_id, image_id, &text)
                        .await
                    {
                        warn!(image_id, "Failed to persist OCR result: {}", e);
                    }
                }
                Ok(())
            }
        }
    }

    /// Runs structured extraction over previously produced OCR text. Legal
    /// from `OcrDone`, `AnalysisError` (retry) and `AnalysisDone` (redo).
    pub async fn analyze(&self, image_id: &str) -> Result<(), SyncError> {
        let record = self.require(image_id)?;
        if record.status.is_running() {
            return Err(SyncError::OperationInFlight(image_id.to_string()));
        }
        if !record.status.can_start_analysis() {
            return Err(SyncError::InvalidTransition(format!(
                "cannot analyze image in state {:?}",
                record.status
            )));
        }
        let ocr_text = match record.ocr_text.as_deref() {
            Some(text) if !text.trim().is_empty() => text.to_string(),
            _ => {
                return Err(SyncError::InvalidTransition(
                    "analysis requires OCR text".to_string(),
                ));
            }
        };
        let _guard = self.claim(image_id)?;

        self.registry
            .upsert(self.start_running(&record, ImageStatus::AnalysisRunning));
        info!(image_id, "Analysis started");

        match timeout(self.operation_timeout, self.recognition.analyze(&ocr_text)).await {
            Err(_) => {
                let message = format!(
                    "Analysis timed out after {}s",
                    self.operation_timeout.as_secs()
                );
                self.fail_if_running(
                    image_id,
                    ImageStatus::AnalysisRunning,
                    ImageStatus::AnalysisError,
                    &message,
                );
                Err(SyncError::Timeout {
                    operation: "Analysis",
                    window_secs: self.operation_timeout.as_secs(),
                })
            }
            Ok(Err(e)) => {
                self.fail_if_running(
                    image_id,
                    ImageStatus::AnalysisRunning,
                    ImageStatus::AnalysisError,
                    &e.to_string(),
                );
                Err(e)
            }
            Ok(Ok(analysis)) => {
                let confirmed = self.complete_analysis(image_id, &analysis);
                if confirmed {
                    info!(
                        image_id,
                        is_invoice = analysis.is_invoice_confirmed,
                        "Analysis finished"
                    );
                    if let Err(e) = self
                        .backend
                        .update_analysis(&self.project_id, image_id, &analysis)
                        .await
                    {
                        warn!(image_id, "Failed to persist analysis result: {}", e);
                    }
                }
                Ok(())
            }
        }
    }

    async fn run_ocr(&self, record: &ImageRecord) -> Result<String, SyncError> {
        let path = record.storage_path.as_deref().ok_or_else(|| {
            SyncError::InvalidTransition("image binary has not been stored yet".to_string())
        })?;
        let bytes = self.storage.fetch_binary(path).await?;
        self.recognition.detect_text(bytes).await
    }

    // The running state claims a fresh authority stamp. Push delivery is
    // at-least-once, so the frame this operation started from can be
    // redelivered mid-flight; with an equal or older stamp the registry
    // ignores it instead of reverting the running state.
    fn start_running(&self, record: &ImageRecord, status: ImageStatus) -> ImageRecord {
        let mut running = record.with_status(status);
        running.last_processed_at = Some(chrono::Utc::now());
        running
    }

    fn require(&self, image_id: &str) -> Result<ImageRecord, SyncError> {
        self.registry
            .get(image_id)
            .ok_or_else(|| SyncError::NotFound(format!("image {}", image_id)))
    }

    // One scan/analysis per image at a time; a second request is rejected,
    // never queued. The guard releases on every exit path.
    fn claim(&self, image_id: &str) -> Result<InFlightGuard<'_>, SyncError> {
        match self.in_flight.entry(image_id.to_string()) {
            Entry::Occupied(_) => Err(SyncError::OperationInFlight(image_id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(InFlightGuard {
                    map: &self.in_flight,
                    image_id: image_id.to_string(),
                })
            }
        }
    }

    // Applies a success only while the attempt is still the current one.
    // A result landing after a forced timeout finds the record in an error
    // state and is discarded.
    fn complete_ocr(&self, image_id: &str, text: &str) -> bool {
        match self.registry.get(image_id) {
            Some(current) if current.status == ImageStatus::OcrRunning => {
                let mut done = current.with_status(ImageStatus::OcrDone);
                done.ocr_text = Some(text.to_string());
                done.last_processed_at = Some(chrono::Utc::now());
                self.registry.upsert(done);
                true
            }
            _ => {
                warn!(image_id, "Discarding late OCR result");
                false
            }
        }
    }

    fn complete_analysis(&self, image_id: &str, analysis: &InvoiceAnalysis) -> bool {
        match self.registry.get(image_id) {
            Some(current) if current.status == ImageStatus::AnalysisRunning => {
                let mut done = current.with_status(ImageStatus::AnalysisDone);
                done.analysis = Some(analysis.clone());
                done.last_processed_at = Some(chrono::Utc::now());
                self.registry.upsert(done);
                true
            }
            _ => {
                warn!(image_id, "Discarding late analysis result");
                false
            }
        }
    }

    fn fail_if_running(
        &self,
        image_id: &str,
        expected: ImageStatus,
        error_status: ImageStatus,
        message: &str,
    ) {
        if let Some(current) = self.registry.get(image_id) {
            if current.status == expected {
                warn!(image_id, "{}", message);
                self.registry.upsert(current.with_error(error_status, message));
            }
        }
    }
}

struct InFlightGuard<'a> {
    map: &'a DashMap<String, ()>,
    image_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.image_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::repositories::backend::MockImageBackend;
    use crate::interfaces::repositories::recognition::MockRecognitionService;
    use crate::interfaces::repositories::storage::MockObjectStorage;

    fn stored_record(id: &str, status: ImageStatus) -> ImageRecord {
        let mut record = ImageRecord::pending_upload();
        record.id = id.to_string();
        record.storage_path = Some(format!("projects/p1/{}.jpg", id));
        record.status = status;
        record
    }

    fn pipeline(
        registry: Arc<ImageRegistry>,
        recognition: MockRecognitionService,
        storage: MockObjectStorage,
        backend: MockImageBackend,
    ) -> ProcessingPipeline<MockRecognitionService, MockObjectStorage, MockImageBackend> {
        ProcessingPipeline::new(
            registry,
            recognition,
            storage,
            backend,
            "p1",
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn scan_while_running_is_rejected_without_backend_call() {
        let registry = Arc::new(ImageRegistry::new());
        registry.upsert(stored_record("img1", ImageStatus::OcrRunning));
        let before = registry.get("img1").unwrap();

        let mut recognition = MockRecognitionService::new();
        recognition.expect_detect_text().times(0);
        let mut storage = MockObjectStorage::new();
        storage.expect_fetch_binary().times(0);

        let pipeline = pipeline(registry.clone(), recognition, storage, MockImageBackend::new());

        let err = pipeline.scan("img1").await.unwrap_err();
        assert!(matches!(err, SyncError::OperationInFlight(_)));
        assert_eq!(registry.get("img1").unwrap(), before);
    }

    #[tokio::test]
    async fn empty_ocr_text_becomes_ocr_error() {
        let registry = Arc::new(ImageRegistry::new());
        registry.upsert(stored_record("img1", ImageStatus::Ready));

        let mut storage = MockObjectStorage::new();
        storage
            .expect_fetch_binary()
            .returning(|_| Ok(vec![0xFF, 0xD8]));
        let mut recognition = MockRecognitionService::new();
        recognition
            .expect_detect_text()
            .returning(|_| Ok("   ".to_string()));
        let mut backend = MockImageBackend::new();
        backend.expect_update_ocr().times(0);

        let pipeline = pipeline(registry.clone(), recognition, storage, backend);

        let err = pipeline.scan("img1").await.unwrap_err();
        assert!(matches!(err, SyncError::DataIntegrity(_)));
        let record = registry.get("img1").unwrap();
        assert_eq!(record.status, ImageStatus::OcrError);
        assert!(record.error_message.unwrap().contains("no text"));
    }

    #[tokio::test]
    async fn analyze_requires_ocr_text() {
        let registry = Arc::new(ImageRegistry::new());
        let mut record = stored_record("img1", ImageStatus::OcrDone);
        record.ocr_text = None;
        registry.upsert(record);

        let mut recognition = MockRecognitionService::new();
        recognition.expect_analyze().times(0);

        let pipeline = pipeline(
            registry,
            recognition,
            MockObjectStorage::new(),
            MockImageBackend::new(),
        );

        let err = pipeline.analyze("img1").await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn persistence_failure_keeps_local_success() {
        let registry = Arc::new(ImageRegistry::new());
        registry.upsert(stored_record("img1", ImageStatus::Ready));

        let mut storage = MockObjectStorage::new();
        storage
            .expect_fetch_binary()
            .returning(|_| Ok(vec![0xFF, 0xD8]));
        let mut recognition = MockRecognitionService::new();
        recognition
            .expect_detect_text()
            .returning(|_| Ok("Total: 42.00 USD".to_string()));
        let mut backend = MockImageBackend::new();
        backend
            .expect_update_ocr()
            .returning(|_, _, _| Err(SyncError::Network("persist failed".to_string())));

        let pipeline = pipeline(registry.clone(), recognition, storage, backend);

        pipeline.scan("img1").await.unwrap();
        let record = registry.get("img1").unwrap();
        assert_eq!(record.status, ImageStatus::OcrDone);
        assert_eq!(record.ocr_text.as_deref(), Some("Total: 42.00 USD"));
    }
}
