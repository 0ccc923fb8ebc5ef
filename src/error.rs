//! Error types for the signature chain library.
//!
//! Cryptographic mismatches are deliberately absent: a signature that does not
//! verify is a normal outcome (`false` from the engine, an `Invalid` entry in a
//! validation report), never an `Error`.

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while signing or validating documents.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input could not be parsed as a PDF, or lacks required structure
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    /// The embedded signature chain violates its order-sequence integrity
    #[error("Signature chain corrupted: {0}")]
    ChainCorrupted(String),

    /// The signing engine executable is missing, cannot be launched, or timed out
    #[error("Signing engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The signing engine ran but its exit status or output broke the call contract
    #[error("Signing engine protocol error: {0}")]
    EngineProtocolError(String),

    /// A persisted record required by the operation does not exist
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// Caller-supplied data failed validation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File storage backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        Error::MalformedDocument(err.to_string())
    }
}
