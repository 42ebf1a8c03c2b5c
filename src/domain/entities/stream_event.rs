use serde::Deserialize;

use crate::entities::image_record::ImageRecord;
use crate::errors::SyncError;

/// Wrapper shape some backend versions emit instead of a bare array.
#[derive(Debug, Deserialize)]
struct ImageBatchEnvelope {
    images: Vec<ImageRecord>,
}

/// Decodes the data body of a push frame into a batch of image records.
///
/// The channel delivers heterogeneous payloads on one connection: a JSON
/// array of records, a single record object, or an `{"images": [...]}`
/// envelope. Anything else is a data-integrity error; the caller drops
/// the frame and keeps the stream alive.
pub fn decode_image_batch(data: &str) -> Result<Vec<ImageRecord>, SyncError> {
    let trimmed = data.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if let Ok(batch) = serde_json::from_str::<Vec<ImageRecord>>(trimmed) {
        return Ok(batch);
    }
    if let Ok(envelope) = serde_json::from_str::<ImageBatchEnvelope>(trimmed) {
        return Ok(envelope.images);
    }
    match serde_json::from_str::<ImageRecord>(trimmed) {
        Ok(record) => Ok(vec![record]),
        Err(e) => Err(SyncError::DataIntegrity(format!(
            "unrecognized push payload: {}",
            e
        ))),
    }
}

/// Health of the push-channel subscription, published separately from
/// record updates so the UI can show a degraded-sync indicator without
/// discarding known image state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamHealth {
    /// No connection attempt has been made yet.
    Idle,
    Connected,
    /// The subscription is retrying after an error; known state remains valid.
    Degraded { message: String },
    /// The subscription was stopped deliberately and will not reconnect.
    Stopped,
}
