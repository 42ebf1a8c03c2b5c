use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use zeroize::Zeroizing;

use crate::entities::image_record::InvoiceAnalysis;
use crate::errors::SyncError;
use crate::infrastructure::http::check_status;
use crate::infrastructure::join_base;
use crate::interfaces::repositories::recognition::RecognitionService;

#[derive(Debug, Deserialize)]
struct DetectTextResponse {
    text: String,
}

/// OCR/analysis service client. Authenticated with a static API key
/// rather than user bearer tokens.
pub struct HttpRecognition {
    client: reqwest::Client,
    base_url: String,
    api_key: Zeroizing<String>,
}

impl HttpRecognition {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Zeroizing<String>,
    ) -> Self {
        HttpRecognition {
            client,
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl RecognitionService for HttpRecognition {
    async fn detect_text(&self, image_bytes: Vec<u8>) -> Result<String, SyncError> {
        let response = self
            .client
            .post(join_base(&self.base_url, "v1/detect-text")?)
            .header("x-api-key", self.api_key.as_str())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image_bytes)
            .send()
            .await?;
        let detected = check_status(response)
            .await?
            .json::<DetectTextResponse>()
            .await?;
        Ok(detected.text)
    }

    async fn analyze(&self, ocr_text: &str) -> Result<InvoiceAnalysis, SyncError> {
        let response = self
            .client
            .post(join_base(&self.base_url, "v1/analyze")?)
            .header("x-api-key", self.api_key.as_str())
            .json(&json!({ "text": ocr_text }))
            .send()
            .await?;
        let analysis = check_status(response)
            .await?
            .json::<InvoiceAnalysis>()
            .await?;
        Ok(analysis)
    }
}
