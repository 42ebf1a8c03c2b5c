use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::entities::image_record::{ImageRecord, InvoiceAnalysis};
use crate::errors::SyncError;
use crate::infrastructure::http::check_status;
use crate::infrastructure::join_base;
use crate::interfaces::repositories::backend::ImageBackend;
use crate::interfaces::repositories::token::TokenProvider;

/// Metadata backend over the REST surface
/// (`POST/PATCH/DELETE /projects/{id}/images[...]`). Every call fetches a
/// fresh bearer token from the provider.
pub struct RestImageBackend<T: TokenProvider> {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<T>,
}

impl<T: TokenProvider> RestImageBackend<T> {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, tokens: Arc<T>) -> Self {
        RestImageBackend {
            client,
            base_url: base_url.into(),
            tokens,
        }
    }

    fn images_url(&self, project_id: &str) -> Result<url::Url, SyncError> {
        join_base(
            &self.base_url,
            &format!("projects/{}/images", urlencoding::encode(project_id)),
        )
    }

    fn image_url(
        &self,
        project_id: &str,
        image_id: &str,
        suffix: &str,
    ) -> Result<url::Url, SyncError> {
        join_base(
            &self.base_url,
            &format!(
                "projects/{}/images/{}{}",
                urlencoding::encode(project_id),
                urlencoding::encode(image_id),
                suffix
            ),
        )
    }
}

#[async_trait]
impl<T: TokenProvider> ImageBackend for RestImageBackend<T> {
    async fn create_record(
        &self,
        project_id: &str,
        record: &ImageRecord,
    ) -> Result<ImageRecord, SyncError> {
        let token = self.tokens.fresh_token().await?;
        let response = self
            .client
            .post(self.images_url(project_id)?)
            .bearer_auth(token)
            .json(record)
            .send()
            .await?;
        let confirmed = check_status(response).await?.json::<ImageRecord>().await?;
        Ok(confirmed)
    }

    async fn update_ocr(
        &self,
        project_id: &str,
        image_id: &str,
        ocr_text: &str,
    ) -> Result<(), SyncError> {
        let token = self.tokens.fresh_token().await?;
        let response = self
            .client
            .patch(self.image_url(project_id, image_id, "/ocr")?)
            .bearer_auth(token)
            .json(&json!({ "ocrText": ocr_text }))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn update_analysis(
        &self,
        project_id: &str,
        image_id: &str,
        analysis: &InvoiceAnalysis,
    ) -> Result<(), SyncError> {
        let token = self.tokens.fresh_token().await?;
        let response = self
            .client
            .patch(self.image_url(project_id, image_id, "/analysis")?)
            .bearer_auth(token)
            .json(analysis)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn delete_record(&self, project_id: &str, image_id: &str) -> Result<(), SyncError> {
        let token = self.tokens.fresh_token().await?;
        let response = self
            .client
            .delete(self.image_url(project_id, image_id, "")?)
            .bearer_auth(token)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn fetch_all(&self, project_id: &str) -> Result<Vec<ImageRecord>, SyncError> {
        let token = self.tokens.fresh_token().await?;
        let response = self
            .client
            .get(self.images_url(project_id)?)
            .bearer_auth(token)
            .send()
            .await?;
        let records = check_status(response)
            .await?
            .json::<Vec<ImageRecord>>()
            .await?;
        Ok(records)
    }
}
