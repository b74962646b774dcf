//! Session error types

/// Errors raised by the document store backing a repository
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// An index with the same name or key already exists with other options
    #[error("Index already exists: {0}")]
    IndexAlreadyExists(String),

    /// A unique constraint was violated
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// The store could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Any other backend failure
    #[error("Store error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether this error only reports that an index is already in place.
    pub fn is_index_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::IndexAlreadyExists(_) | StoreError::DuplicateKey(_)
        )
    }
}

/// Errors that can occur during session operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A session could not be converted into its stored form
    #[error("Cannot convert session {id}: {reason}")]
    Conversion { id: String, reason: String },

    /// Error from the document store
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Error during serialization
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A step scheduled on the blocking pool was cancelled or panicked
    #[error("Scheduled task failed: {0}")]
    Task(String),
}

impl SessionError {
    pub(crate) fn conversion(id: &str, reason: impl Into<String>) -> Self {
        SessionError::Conversion {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<tokio::task::JoinError> for SessionError {
    fn from(err: tokio::task::JoinError) -> Self {
        SessionError::Task(err.to_string())
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
