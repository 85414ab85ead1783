use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("Invalid blob key: {0:?}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure classes reported by an embedding provider.
///
/// Only [`EmbedError::Unreachable`] means the provider itself is absent;
/// every other variant is request-specific and may succeed on retry.
#[derive(Debug, Clone, Error)]
pub enum EmbedError {
    #[error("embeddings disabled")]
    Disabled,

    #[error("empty text")]
    EmptyInput,

    #[error("embedding provider unreachable: {0}")]
    Unreachable(String),

    #[error("embedding request failed: {0}")]
    Transport(String),

    #[error("embedding provider error ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("malformed embedding response: {0}")]
    Malformed(String),
}

impl EmbedError {
    /// True for connection-level failures (refused, unreachable, timed out).
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}
