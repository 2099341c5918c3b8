use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the tracker core.
///
/// Validation and corpus-parse errors are rejected before any write;
/// conflict variants cover illegal run transitions and stale grading
/// writes. The API layer maps these onto HTTP status codes.
#[derive(Error, Debug)]
pub enum Error {
    #[error("validation error: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("stale grading write for response {response_id}: expected version {expected}, found {found}")]
    StaleVersion {
        response_id: i64,
        expected: i64,
        found: i64,
    },

    #[error("invalid corpus JSON: {0}")]
    CorpusParse(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("provider timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found<I: ToString>(entity: &'static str, id: I) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::Conflict(message.into())
    }
}
