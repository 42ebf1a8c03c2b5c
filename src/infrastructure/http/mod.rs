pub mod object_storage;
pub mod rest_backend;
pub mod vision;

use crate::errors::SyncError;

// Shared response check for all REST adapters: auth failures must stay
// distinguishable from plain network errors.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SyncError> {
    let status = response.status();
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(SyncError::Auth(format!("backend returned {}", status)));
    }
    if status.as_u16() == 404 {
        let url = response.url().clone();
        return Err(SyncError::NotFound(url.path().to_string()));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SyncError::Backend(format!(
            "backend returned {}: {}",
            status,
            body.chars().take(200).collect::<String>()
        )));
    }
    Ok(response)
}
