use thiserror::Error;

/// Core error type for election operations.
#[derive(Error, Debug)]
pub enum ElectionError {
    #[error("No on-elected callback was configured")]
    InvalidCallback,

    #[error("Invalid election path: {0}")]
    InvalidPath(String),

    #[error("Coordination service unavailable: {0}")]
    CoordinationUnavailable(String),

    #[error("Node already exists: {0}")]
    NodeExists(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Session expired")]
    SessionExpired,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ElectionError {
    /// Whether the error signals a node-existence conflict.
    ///
    /// Idempotent parent-path creation treats this as success: a racing
    /// candidate creating the same segment first is not a failure.
    pub fn is_node_exists(&self) -> bool {
        matches!(self, Self::NodeExists(_))
    }
}

/// Result type alias using ElectionError.
pub type Result<T> = std::result::Result<T, ElectionError>;
