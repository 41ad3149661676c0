use thiserror::Error;

/// Fuser error types
///
/// The fusion path itself never fails; these cover configuration,
/// session files and publishing sinks.
#[derive(Error, Debug)]
pub enum FuserError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Sink closed: {0}")]
    SinkClosed(String),
}

/// Result type for fallible non-fusion operations
pub type Result<T> = std::result::Result<T, FuserError>;
