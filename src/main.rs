use std::env;
use std::sync::Arc;

use anyhow::Context;
use invoice_sync_engine::{
    SyncEngine,
    entities::stream_event::StreamHealth,
    graceful_shutdown::shutdown_signal,
    repositories::token::StaticTokenProvider,
    settings::EngineConfig,
};

/// Tails a project's invoice-image stream and prints every state change.
/// Mostly a debugging aid; the real consumer is the mobile UI layer.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = match EngineConfig::new() {
        Ok(cfg) => {
            tracing::info!("Loaded configuration: {:?}", cfg);
            cfg
        }
        Err(e) => {
            tracing::error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let project_id = env::args()
        .nth(1)
        .context("usage: invoice-stream-tail <project-id>")?;
    let token = env::var("APP_API_TOKEN").unwrap_or_default();
    let tokens = Arc::new(StaticTokenProvider::new(token));

    let engine = SyncEngine::new(&config, project_id.clone(), tokens)?;

    match engine.mutations.refresh().await {
        Ok(count) => tracing::info!("Loaded {} image records for {}", count, project_id),
        Err(e) => tracing::warn!("Initial refresh failed: {}", e),
    }

    let handle = engine.subscribe_stream()?;
    let mut images = engine.images();
    let mut health = handle.health();

    tracing::info!("Streaming image updates for project {}", project_id);

    let tail = async {
        loop {
            tokio::select! {
                changed = images.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    for record in images.borrow_and_update().iter() {
                        println!(
                            "{}  {:?}  {}",
                            record.id,
                            record.status,
                            record.error_message.as_deref().unwrap_or("-")
                        );
                    }
                }
                changed = health.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = health.borrow_and_update().clone();
                    if let StreamHealth::Degraded { message } = state {
                        tracing::warn!("Sync degraded: {}", message);
                    }
                }
            }
        }
    };

    tokio::select! {
        _ = tail => {},
        _ = shutdown_signal() => {},
    }

    handle.stop();
    Ok(())
}
