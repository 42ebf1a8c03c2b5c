use std::sync::Arc;

mod domain;
mod interfaces;
mod infrastructure;
pub mod errors;
pub mod settings;
pub mod constants;
pub mod graceful_shutdown;

pub use domain::{entities, use_cases};
pub use interfaces::repositories;
pub use infrastructure::{http, stream};

use entities::image_record::ImageRecord;
use errors::SyncError;
use http::object_storage::HttpObjectStorage;
use http::rest_backend::RestImageBackend;
use http::vision::HttpRecognition;
use repositories::codec::PassthroughCodec;
use repositories::token::TokenProvider;
use settings::EngineConfig;
use stream::subscriber::{ImageStreamSubscriber, StreamHandle};
use tokio::sync::watch;
use use_cases::mutations::MutationCoordinator;
use use_cases::processing::ProcessingPipeline;
use use_cases::registry::{ImageRegistry, ImageSnapshot};

pub type AppProcessing<T> =
    ProcessingPipeline<HttpRecognition, HttpObjectStorage<T>, RestImageBackend<T>>;
pub type AppMutations<T> =
    MutationCoordinator<HttpObjectStorage<T>, RestImageBackend<T>, PassthroughCodec>;

/// One engine per open project: the registry, the processing pipeline and
/// the mutation coordinator wired to the HTTP adapters. The push-channel
/// subscription is started separately so the UI can decide when live sync
/// is worth a socket.
pub struct SyncEngine<T: TokenProvider + 'static> {
    pub registry: Arc<ImageRegistry>,
    pub processing: AppProcessing<T>,
    pub mutations: AppMutations<T>,
    config: EngineConfig,
    project_id: String,
    client: reqwest::Client,
    tokens: Arc<T>,
}

impl<T: TokenProvider + 'static> SyncEngine<T> {
    pub fn new(
        config: &EngineConfig,
        project_id: impl Into<String>,
        tokens: Arc<T>,
    ) -> Result<Self, SyncError> {
        let project_id = project_id.into();
        let client = reqwest::Client::builder()
            .user_agent(constants::USER_AGENT)
            .build()?;

        let registry = Arc::new(ImageRegistry::new());

        let processing = ProcessingPipeline::new(
            registry.clone(),
            HttpRecognition::new(
                client.clone(),
                config.recognition_base_url.clone(),
                config.recognition_api_key(),
            ),
            HttpObjectStorage::new(
                client.clone(),
                config.storage_base_url.clone(),
                tokens.clone(),
            ),
            RestImageBackend::new(client.clone(), config.api_base_url.clone(), tokens.clone()),
            project_id.clone(),
            config.operation_timeout(),
        );

        let mutations = MutationCoordinator::new(
            registry.clone(),
            HttpObjectStorage::new(
                client.clone(),
                config.storage_base_url.clone(),
                tokens.clone(),
            ),
            RestImageBackend::new(client.clone(), config.api_base_url.clone(), tokens.clone()),
            PassthroughCodec,
            project_id.clone(),
            config.signed_url_ttl(),
            config.max_upload_bytes,
        );

        Ok(SyncEngine {
            registry,
            processing,
            mutations,
            config: config.clone(),
            project_id,
            client,
            tokens,
        })
    }

    /// Reactive image list for the UI layer.
    pub fn images(&self) -> watch::Receiver<ImageSnapshot> {
        self.registry.subscribe()
    }

    pub fn list(&self) -> Vec<ImageRecord> {
        self.registry.list()
    }

    /// Starts the live push-channel subscription for this project.
    pub fn subscribe_stream(&self) -> Result<StreamHandle, SyncError> {
        let subscriber = ImageStreamSubscriber::new(
            self.client.clone(),
            self.registry.clone(),
            self.tokens.clone(),
            &self.config.api_base_url,
            &self.project_id,
            self.config.stream_retry_interval(),
        )?;
        Ok(subscriber.spawn())
    }
}
