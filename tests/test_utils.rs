#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use invoice_sync_engine::entities::image_record::{ImageRecord, ImageStatus, InvoiceAnalysis};
use invoice_sync_engine::errors::SyncError;
use invoice_sync_engine::repositories::backend::ImageBackend;
use invoice_sync_engine::repositories::codec::PassthroughCodec;
use invoice_sync_engine::repositories::recognition::RecognitionService;
use invoice_sync_engine::repositories::storage::ObjectStorage;
use invoice_sync_engine::use_cases::mutations::MutationCoordinator;
use invoice_sync_engine::use_cases::processing::ProcessingPipeline;
use invoice_sync_engine::use_cases::registry::ImageRegistry;

pub const PROJECT: &str = "trip-2026-berlin";

/// Minimal JPEG magic so `infer` accepts the payload as an image.
pub fn jpeg_bytes() -> Vec<u8> {
    vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46]
}

pub fn stored_record(id: &str, status: ImageStatus) -> ImageRecord {
    let mut record = ImageRecord::pending_upload();
    record.id = id.to_string();
    record.storage_path = Some(format!("projects/{}/images/{}.jpg", PROJECT, id));
    record.status = status;
    record
}

#[derive(Default)]
struct StorageState {
    blobs: HashMap<String, Vec<u8>>,
    deleted: Vec<String>,
    fail_uploads: bool,
    fail_deletes: bool,
}

/// In-memory blob store double.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    state: Arc<Mutex<StorageState>>,
}

impl InMemoryStorage {
    pub fn fail_uploads(&self) {
        self.state.lock().fail_uploads = true;
    }

    pub fn fail_deletes(&self) {
        self.state.lock().fail_deletes = true;
    }

    pub fn put_blob(&self, path: &str, bytes: Vec<u8>) {
        self.state.lock().blobs.insert(path.to_string(), bytes);
    }

    pub fn blob_count(&self) -> usize {
        self.state.lock().blobs.len()
    }

    pub fn deleted_paths(&self) -> Vec<String> {
        self.state.lock().deleted.clone()
    }
}

#[async_trait]
impl ObjectStorage for InMemoryStorage {
    async fn upload_binary(
        &self,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, SyncError> {
        let mut state = self.state.lock();
        if state.fail_uploads {
            return Err(SyncError::Storage("upload refused".to_string()));
        }
        state.blobs.insert(path.to_string(), bytes);
        Ok(path.to_string())
    }

    async fn delete_file(&self, path: &str) -> Result<(), SyncError> {
        let mut state = self.state.lock();
        if state.fail_deletes {
            return Err(SyncError::Storage("delete refused".to_string()));
        }
        state.blobs.remove(path);
        state.deleted.push(path.to_string());
        Ok(())
    }

    async fn signed_url(&self, path: &str, _ttl: Duration) -> Result<String, SyncError> {
        Ok(format!("https://cdn.test/{}?sig=abc", path))
    }

    async fn fetch_binary(&self, path: &str) -> Result<Vec<u8>, SyncError> {
        self.state
            .lock()
            .blobs
            .get(path)
            .cloned()
            .ok_or_else(|| SyncError::Storage(format!("no blob at {}", path)))
    }
}

#[derive(Default)]
struct BackendState {
    records: HashMap<String, ImageRecord>,
    fail_creates: bool,
    fail_deletes: bool,
    fail_updates: bool,
    create_calls: usize,
    delete_calls: usize,
}

/// In-memory metadata backend double. Confirms records by echoing them
/// back with a server timestamp.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<Mutex<BackendState>>,
}

impl InMemoryBackend {
    pub fn fail_creates(&self) {
        self.state.lock().fail_creates = true;
    }

    pub fn fail_deletes(&self) {
        self.state.lock().fail_deletes = true;
    }

    pub fn fail_updates(&self) {
        self.state.lock().fail_updates = true;
    }

    pub fn seed(&self, record: ImageRecord) {
        self.state.lock().records.insert(record.id.clone(), record);
    }

    pub fn record(&self, id: &str) -> Option<ImageRecord> {
        self.state.lock().records.get(id).cloned()
    }

    pub fn create_calls(&self) -> usize {
        self.state.lock().create_calls
    }

    pub fn delete_calls(&self) -> usize {
        self.state.lock().delete_calls
    }
}

#[async_trait]
impl ImageBackend for InMemoryBackend {
    async fn create_record(
        &self,
        _project_id: &str,
        record: &ImageRecord,
    ) -> Result<ImageRecord, SyncError> {
        let mut state = self.state.lock();
        state.create_calls += 1;
        if state.fail_creates {
            return Err(SyncError::Backend("create refused".to_string()));
        }
        let mut confirmed = record.clone();
        confirmed.last_processed_at = Some(Utc::now());
        state.records.insert(confirmed.id.clone(), confirmed.clone());
        Ok(confirmed)
    }

    async fn update_ocr(
        &self,
        _project_id: &str,
        image_id: &str,
        ocr_text: &str,
    ) -> Result<(), SyncError> {
        let mut state = self.state.lock();
        if state.fail_updates {
            return Err(SyncError::Backend("update refused".to_string()));
        }
        if let Some(record) = state.records.get_mut(image_id) {
            record.ocr_text = Some(ocr_text.to_string());
            record.status = ImageStatus::OcrDone;
        }
        Ok(())
    }

    async fn update_analysis(
        &self,
        _project_id: &str,
        image_id: &str,
        analysis: &InvoiceAnalysis,
    ) -> Result<(), SyncError> {
        let mut state = self.state.lock();
        if state.fail_updates {
            return Err(SyncError::Backend("update refused".to_string()));
        }
        if let Some(record) = state.records.get_mut(image_id) {
            record.analysis = Some(analysis.clone());
            record.status = ImageStatus::AnalysisDone;
        }
        Ok(())
    }

    async fn delete_record(&self, _project_id: &str, image_id: &str) -> Result<(), SyncError> {
        let mut state = self.state.lock();
        state.delete_calls += 1;
        if state.fail_deletes {
            return Err(SyncError::Backend("delete refused".to_string()));
        }
        state.records.remove(image_id);
        Ok(())
    }

    async fn fetch_all(&self, _project_id: &str) -> Result<Vec<ImageRecord>, SyncError> {
        Ok(self.state.lock().records.values().cloned().collect())
    }
}

#[derive(Default)]
struct RecognitionState {
    text: Option<Result<String, String>>,
    analysis: Option<Result<InvoiceAnalysis, String>>,
    delay: Option<Duration>,
    detect_calls: usize,
    analyze_calls: usize,
}

/// Scripted recognition double: one configured outcome per operation,
/// with an optional artificial delay for timeout tests.
#[derive(Clone, Default)]
pub struct ScriptedRecognition {
    state: Arc<Mutex<RecognitionState>>,
}

impl ScriptedRecognition {
    pub fn script_text(&self, text: &str) {
        self.state.lock().text = Some(Ok(text.to_string()));
    }

    pub fn script_analysis(&self, analysis: InvoiceAnalysis) {
        self.state.lock().analysis = Some(Ok(analysis));
    }

    pub fn script_delay(&self, delay: Duration) {
        self.state.lock().delay = Some(delay);
    }

    pub fn detect_calls(&self) -> usize {
        self.state.lock().detect_calls
    }

    pub fn analyze_calls(&self) -> usize {
        self.state.lock().analyze_calls
    }

    async fn apply_delay(&self) {
        let delay = self.state.lock().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl RecognitionService for ScriptedRecognition {
    async fn detect_text(&self, _image_bytes: Vec<u8>) -> Result<String, SyncError> {
        self.state.lock().detect_calls += 1;
        self.apply_delay().await;
        match self.state.lock().text.clone() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(SyncError::Network(message)),
            None => Err(SyncError::Network("no scripted OCR result".to_string())),
        }
    }

    async fn analyze(&self, _ocr_text: &str) -> Result<InvoiceAnalysis, SyncError> {
        self.state.lock().analyze_calls += 1;
        self.apply_delay().await;
        match self.state.lock().analysis.clone() {
            Some(Ok(analysis)) => Ok(analysis),
            Some(Err(message)) => Err(SyncError::Network(message)),
            None => Err(SyncError::Network("no scripted analysis result".to_string())),
        }
    }
}

pub struct TestHarness {
    pub registry: Arc<ImageRegistry>,
    pub storage: InMemoryStorage,
    pub backend: InMemoryBackend,
    pub recognition: ScriptedRecognition,
}

impl TestHarness {
    pub fn new() -> Self {
        TestHarness {
            registry: Arc::new(ImageRegistry::new()),
            storage: InMemoryStorage::default(),
            backend: InMemoryBackend::default(),
            recognition: ScriptedRecognition::default(),
        }
    }

    pub fn pipeline(
        &self,
        timeout: Duration,
    ) -> ProcessingPipeline<ScriptedRecognition, InMemoryStorage, InMemoryBackend> {
        ProcessingPipeline::new(
            self.registry.clone(),
            self.recognition.clone(),
            self.storage.clone(),
            self.backend.clone(),
            PROJECT,
            timeout,
        )
    }

    pub fn mutations(&self) -> MutationCoordinator<InMemoryStorage, InMemoryBackend, PassthroughCodec> {
        MutationCoordinator::new(
            self.registry.clone(),
            self.storage.clone(),
            self.backend.clone(),
            PassthroughCodec,
            PROJECT,
            Duration::from_secs(3600),
            5 * 1024 * 1024,
        )
    }

    /// Seeds registry, backend and blob store with a consistent record so
    /// scan/analyze have a binary to work on.
    pub fn seed_image(&self, id: &str, status: ImageStatus) -> ImageRecord {
        let record = stored_record(id, status);
        self.storage
            .put_blob(record.storage_path.as_deref().unwrap(), jpeg_bytes());
        self.backend.seed(record.clone());
        self.registry.upsert(record.clone());
        record
    }
}
