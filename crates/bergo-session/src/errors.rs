use thiserror::Error;

/// Failures of the durable session layer.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("git error: {0}")]
    Git(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("home directory could not be determined")]
    NoHomeDirectory,
}
