use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::errors::SyncError;
use crate::infrastructure::http::check_status;
use crate::infrastructure::join_base;
use crate::interfaces::repositories::storage::ObjectStorage;
use crate::interfaces::repositories::token::TokenProvider;

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    url: String,
}

#[derive(Debug, Deserialize)]
struct StoredBlobResponse {
    path: String,
}

/// Blob store front speaking plain HTTP: `PUT/GET/DELETE {base}/blobs/{path}`
/// plus a signing endpoint for display URLs.
pub struct HttpObjectStorage<T: TokenProvider> {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<T>,
}

impl<T: TokenProvider> HttpObjectStorage<T> {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, tokens: Arc<T>) -> Self {
        HttpObjectStorage {
            client,
            base_url: base_url.into(),
            tokens,
        }
    }

    fn blob_url(&self, path: &str) -> Result<url::Url, SyncError> {
        // Path segments stay readable; only reserved characters need care.
        join_base(&self.base_url, &format!("blobs/{}", path))
    }
}

#[async_trait]
impl<T: TokenProvider> ObjectStorage for HttpObjectStorage<T> {
    async fn upload_binary(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, SyncError> {
        let token = self.tokens.fresh_token().await?;
        let response = self
            .client
            .put(self.blob_url(path)?)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        let stored = check_status(response)
            .await?
            .json::<StoredBlobResponse>()
            .await?;
        Ok(stored.path)
    }

    async fn delete_file(&self, path: &str) -> Result<(), SyncError> {
        let token = self.tokens.fresh_token().await?;
        let response = self
            .client
            .delete(self.blob_url(path)?)
            .bearer_auth(token)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, SyncError> {
        let token = self.tokens.fresh_token().await?;
        let response = self
            .client
            .post(join_base(&self.base_url, "signed-urls")?)
            .bearer_auth(token)
            .json(&json!({ "path": path, "ttlSecs": ttl.as_secs() }))
            .send()
            .await?;
        let signed = check_status(response)
            .await?
            .json::<SignedUrlResponse>()
            .await?;
        Ok(signed.url)
    }

    async fn fetch_binary(&self, path: &str) -> Result<Vec<u8>, SyncError> {
        let token = self.tokens.fresh_token().await?;
        let response = self
            .client
            .get(self.blob_url(path)?)
            .bearer_auth(token)
            .send()
            .await?;
        let bytes = check_status(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}
