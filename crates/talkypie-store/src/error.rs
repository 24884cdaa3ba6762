//! Error types for the profile store.

/// Errors that can occur while reading or writing the profile document.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing file could not be read, written, or replaced.
    #[error("profile I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted bytes are not a JSON object.
    #[error("profile document is corrupt: {0}")]
    Corrupt(String),

    /// JSON encoding or decoding failed.
    #[error("profile JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A decoded payload was valid JSON but not an object.
    #[error("profile document must be a JSON object")]
    NotAnObject,
}
