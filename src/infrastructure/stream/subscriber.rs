use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

use crate::constants::EVENT_STREAM_MIME;
use crate::entities::stream_event::{StreamHealth, decode_image_batch};
use crate::errors::SyncError;
use crate::infrastructure::stream::sse::SseParser;
use crate::interfaces::repositories::token::TokenProvider;
use crate::use_cases::registry::ImageRegistry;

/// Long-lived subscription to a project's image push channel.
///
/// Translates raw SSE frames into registry upserts. Delivery is
/// at-least-once and unordered; the registry's suppression and authority
/// rules make that safe. Connection failures degrade the health signal and
/// retry forever at a fixed interval, re-fetching the bearer token on
/// every attempt.
pub struct ImageStreamSubscriber<T: TokenProvider> {
    client: reqwest::Client,
    registry: Arc<ImageRegistry>,
    tokens: Arc<T>,
    stream_url: Url,
    retry_interval: Duration,
}

enum ConnectionEnd {
    Stopped,
    Eof,
    Failed(SyncError),
}

impl<T: TokenProvider + 'static> ImageStreamSubscriber<T> {
    pub fn new(
        client: reqwest::Client,
        registry: Arc<ImageRegistry>,
        tokens: Arc<T>,
        api_base_url: &str,
        project_id: &str,
        retry_interval: Duration,
    ) -> Result<Self, SyncError> {
        let stream_url = crate::infrastructure::join_base(
            api_base_url,
            &format!("projects/{}/image-stream", urlencoding::encode(project_id)),
        )?;
        Ok(ImageStreamSubscriber {
            client,
            registry,
            tokens,
            stream_url,
            retry_interval,
        })
    }

    /// Starts the background subscription and returns its handle.
    pub fn spawn(self) -> StreamHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (health_tx, health_rx) = watch::channel(StreamHealth::Idle);

        let task = tokio::spawn(self.run(stop_rx, health_tx));

        StreamHandle {
            stop_tx,
            health_rx,
            task,
        }
    }

    async fn run(self, mut stop_rx: watch::Receiver<bool>, health_tx: watch::Sender<StreamHealth>) {
        loop {
            if *stop_rx.borrow() {
                break;
            }
            match self.connect_once(&mut stop_rx, &health_tx).await {
                ConnectionEnd::Stopped => break,
                ConnectionEnd::Eof => {
                    warn!(url = %self.stream_url, "Image stream closed by server");
                    let _ = health_tx.send(StreamHealth::Degraded {
                        message: "stream closed by server".to_string(),
                    });
                }
                ConnectionEnd::Failed(e) => {
                    warn!(url = %self.stream_url, "Image stream error: {}", e);
                    let _ = health_tx.send(StreamHealth::Degraded {
                        message: e.to_string(),
                    });
                }
            }

            tokio::select! {
                _ = stop_rx.changed() => break,
                _ = sleep(self.retry_interval) => {}
            }
        }

        let _ = health_tx.send(StreamHealth::Stopped);
        debug!(url = %self.stream_url, "Image stream subscription stopped");
    }

    async fn connect_once(
        &self,
        stop_rx: &mut watch::Receiver<bool>,
        health_tx: &watch::Sender<StreamHealth>,
    ) -> ConnectionEnd {
        // A stop during the handshake must not wait for it to finish.
        let response = tokio::select! {
            _ = stop_rx.changed() => return ConnectionEnd::Stopped,
            opened = self.open_stream() => match opened {
                Ok(response) => response,
                Err(e) => return ConnectionEnd::Failed(e),
            },
        };

        info!(url = %self.stream_url, "Image stream connected");
        let _ = health_tx.send(StreamHealth::Connected);

        let mut body = response.bytes_stream();
        let mut parser = SseParser::new();

        loop {
            let chunk = tokio::select! {
                _ = stop_rx.changed() => return ConnectionEnd::Stopped,
                chunk = body.next() => chunk,
            };
            match chunk {
                None => return ConnectionEnd::Eof,
                Some(Err(e)) => return ConnectionEnd::Failed(e.into()),
                Some(Ok(bytes)) => {
                    for event in parser.feed(&bytes) {
                        self.apply_frame(event.event.as_deref(), &event.data);
                    }
                }
            }
        }
    }

    async fn open_stream(&self) -> Result<reqwest::Response, SyncError> {
        // Tokens expire; never reuse one across reconnections.
        let token = self.tokens.fresh_token().await?;

        let response = self
            .client
            .get(self.stream_url.clone())
            .header(reqwest::header::ACCEPT, EVENT_STREAM_MIME)
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(SyncError::Auth(format!(
                "stream endpoint returned {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(SyncError::Stream(format!(
                "stream endpoint returned {}",
                status
            )));
        }
        Ok(response)
    }

    // A malformed frame is dropped and logged; it never tears the stream
    // down or touches the registry.
    fn apply_frame(&self, event_name: Option<&str>, data: &str) {
        match decode_image_batch(data) {
            Ok(batch) => {
                let mut applied = 0;
                for record in batch {
                    if self.registry.upsert(record) {
                        applied += 1;
                    }
                }
                if applied > 0 {
                    debug!(event = ?event_name, applied, "Applied push frame");
                }
            }
            Err(e) => {
                warn!(event = ?event_name, "Dropping malformed push frame: {}", e);
            }
        }
    }
}

/// Handle to a running subscription. Dropping it tears the connection
/// down; re-subscribing always builds a fresh connection.
pub struct StreamHandle {
    stop_tx: watch::Sender<bool>,
    health_rx: watch::Receiver<StreamHealth>,
    task: JoinHandle<()>,
}

impl StreamHandle {
    /// Stream-health signal, distinct from record updates.
    pub fn health(&self) -> watch::Receiver<StreamHealth> {
        self.health_rx.clone()
    }

    /// Halts reconnection attempts and closes the connection.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
        self.task.abort();
    }
}
