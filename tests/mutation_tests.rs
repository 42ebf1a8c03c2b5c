mod test_utils;

use test_utils::*;

use invoice_sync_engine::entities::image_record::{ImageStatus, NewImageUpload};
use invoice_sync_engine::errors::SyncError;

#[tokio::test]
async fn upload_creates_confirmed_record() {
    let harness = TestHarness::new();
    let mutations = harness.mutations();

    let confirmed = mutations
        .upload_image(NewImageUpload::new("receipt.jpg", jpeg_bytes()))
        .await
        .unwrap();

    assert_eq!(confirmed.status, ImageStatus::Ready);
    let path = confirmed.storage_path.as_deref().unwrap();
    assert!(path.contains(PROJECT));
    assert!(path.ends_with("receipt.jpg"));
    assert!(confirmed.display_url.as_deref().unwrap().starts_with("https://"));

    assert_eq!(harness.registry.len(), 1);
    assert_eq!(harness.storage.blob_count(), 1);
    assert!(harness.backend.record(&confirmed.id).is_some());
}

#[tokio::test]
async fn failed_record_creation_cleans_up_blob_and_rolls_back() {
    let harness = TestHarness::new();
    harness.backend.fail_creates();
    let mutations = harness.mutations();

    let err = mutations
        .upload_image(NewImageUpload::new("receipt.jpg", jpeg_bytes()))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Backend(_)));
    // No optimistic leftovers, no orphaned artifact.
    assert!(harness.registry.is_empty());
    assert_eq!(harness.storage.blob_count(), 0);
    assert_eq!(harness.storage.deleted_paths().len(), 1);
}

#[tokio::test]
async fn failed_upload_rolls_back_without_cleanup_call() {
    let harness = TestHarness::new();
    harness.storage.fail_uploads();
    let mutations = harness.mutations();

    let err = mutations
        .upload_image(NewImageUpload::new("receipt.jpg", jpeg_bytes()))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Storage(_)));
    assert!(harness.registry.is_empty());
    // Nothing was stored, so nothing must be deleted.
    assert!(harness.storage.deleted_paths().is_empty());
}

#[tokio::test]
async fn non_image_payload_is_rejected_before_any_side_effect() {
    let harness = TestHarness::new();
    let mutations = harness.mutations();

    let err = mutations
        .upload_image(NewImageUpload::new("notes.txt", b"plain text".to_vec()))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Validation(_)));
    assert!(harness.registry.is_empty());
    assert_eq!(harness.backend.create_calls(), 0);
}

#[tokio::test]
async fn oversized_payload_is_rejected() {
    let harness = TestHarness::new();
    let mutations = harness.mutations();

    let mut bytes = jpeg_bytes();
    bytes.resize(6 * 1024 * 1024, 0);
    let err = mutations
        .upload_image(NewImageUpload::new("huge.jpg", bytes))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Validation(_)));
}

#[tokio::test]
async fn delete_requires_confirmation() {
    let harness = TestHarness::new();
    harness.seed_image("img1", ImageStatus::Ready);
    let mutations = harness.mutations();

    let err = mutations.delete_image("img1", false).await.unwrap_err();

    assert!(matches!(err, SyncError::ConfirmationRequired));
    assert!(harness.registry.get("img1").is_some());
    assert_eq!(harness.backend.delete_calls(), 0);
}

#[tokio::test]
async fn delete_is_never_optimistic() {
    let harness = TestHarness::new();
    harness.seed_image("img1", ImageStatus::Ready);
    harness.backend.fail_deletes();
    let mutations = harness.mutations();

    let err = mutations.delete_image("img1", true).await.unwrap_err();

    assert!(matches!(err, SyncError::Backend(_)));
    // Backend refused: the record stays visible.
    assert!(harness.registry.get("img1").is_some());
}

#[tokio::test]
async fn confirmed_delete_removes_record_and_blob() {
    let harness = TestHarness::new();
    let record = harness.seed_image("img1", ImageStatus::Ready);
    let mutations = harness.mutations();

    mutations.delete_image("img1", true).await.unwrap();

    assert!(harness.registry.get("img1").is_none());
    assert!(harness.backend.record("img1").is_none());
    assert_eq!(
        harness.storage.deleted_paths(),
        vec![record.storage_path.unwrap()]
    );
}

#[tokio::test]
async fn failed_blob_delete_does_not_resurrect_record() {
    let harness = TestHarness::new();
    harness.seed_image("img1", ImageStatus::Ready);
    harness.storage.fail_deletes();
    let mutations = harness.mutations();

    // Metadata delete succeeded; the orphaned blob is only logged.
    mutations.delete_image("img1", true).await.unwrap();
    assert!(harness.registry.get("img1").is_none());
}

#[tokio::test]
async fn refresh_reconciles_registry_with_backend() {
    let harness = TestHarness::new();
    harness.registry.upsert(stored_record("gone", ImageStatus::Ready));
    harness.backend.seed(stored_record("img1", ImageStatus::OcrDone));
    harness.backend.seed(stored_record("img2", ImageStatus::Ready));
    let mutations = harness.mutations();

    let count = mutations.refresh().await.unwrap();

    assert_eq!(count, 2);
    assert!(harness.registry.get("gone").is_none());
    assert!(harness.registry.get("img1").is_some());
    assert!(harness.registry.get("img2").is_some());
}
