use thiserror::Error;

/// Failures that leave the store untouched. Business-rule rejections are
/// reported through `Outcome` instead.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("document is not a JSON object")]
    NotAnObject,
    #[error("invalid backup: {0}")]
    InvalidBackup(String),
}
