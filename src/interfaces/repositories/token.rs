use async_trait::async_trait;

use crate::errors::SyncError;

/// Capability for obtaining backend bearer tokens.
///
/// Tokens expire, so they are re-fetched per call and per stream
/// (re)connection rather than stored in the engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fresh_token(&self) -> Result<String, SyncError>;
}

/// Fixed-token provider for tooling and tests. Real clients plug in their
/// auth SDK here.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        StaticTokenProvider {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn fresh_token(&self) -> Result<String, SyncError> {
        if self.token.is_empty() {
            return Err(SyncError::Auth("no API token configured".to_string()));
        }
        Ok(self.token.clone())
    }
}
