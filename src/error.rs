use thiserror::Error;

use crate::pipeline::storage::StoreError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed feed payload: {0}")]
    MalformedFeed(String),

    #[error("Feed request rejected with status {status}: {message}")]
    FeedStatus { status: u16, message: String },

    #[error("Batch contains no records")]
    EmptyBatch,

    #[error("Caller contract violated: {0}")]
    Contract(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
