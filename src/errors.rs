use derive_more::Display;
use validator::ValidationErrors;

/// Typed failure surface of every core operation.
///
/// The taxonomy matters for the UI: transient failures get a dismissible
/// message with a manual retry, stream failures only degrade the sync
/// indicator, auth failures require re-authentication.
#[derive(Debug, Display)]
pub enum SyncError {
    #[display("Network error: {_0}")]
    Network(String),

    #[display("{operation} timed out after {window_secs}s")]
    Timeout {
        operation: &'static str,
        window_secs: u64,
    },

    #[display("Stream error: {_0}")]
    Stream(String),

    #[display("Authentication failed: {_0}")]
    Auth(String),

    #[display("Malformed payload: {_0}")]
    DataIntegrity(String),

    #[display("Validation error: {_0}")]
    Validation(String),

    #[display("Not found: {_0}")]
    NotFound(String),

    #[display("Illegal transition: {_0}")]
    InvalidTransition(String),

    #[display("Operation already in flight for image {_0}")]
    OperationInFlight(String),

    #[display("Deletion requires user confirmation")]
    ConfirmationRequired,

    #[display("Storage error: {_0}")]
    Storage(String),

    #[display("Backend error: {_0}")]
    Backend(String),
}

impl SyncError {
    /// True for failures that a fresh login would fix, as opposed to a retry.
    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::Auth(_))
    }

    /// True for failures the user may retry manually. Never auto-retried,
    /// to avoid duplicate side effects like double-charging an OCR budget.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_) | SyncError::Timeout { .. } | SyncError::Storage(_)
        )
    }
}

impl std::error::Error for SyncError {}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.status().is_some_and(|s| s.as_u16() == 401) {
            SyncError::Auth(err.to_string())
        } else {
            SyncError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::DataIntegrity(err.to_string())
    }
}

impl From<ValidationErrors> for SyncError {
    fn from(errors: ValidationErrors) -> Self {
        let messages = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| {
                    let message = e
                        .message
                        .as_ref()
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "Invalid value".to_string());
                    format!("{}:{}", field, message)
                })
            })
            .collect::<Vec<_>>()
            .join(", ");

        SyncError::Validation(messages)
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::Backend(format!("Invalid endpoint URL: {}", err))
    }
}
