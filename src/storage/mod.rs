//! File storage for original and signed documents.
//!
//! Storage hands out opaque path references; callers store them in records
//! and pass them back to read or delete.

pub mod local;

pub use local::LocalFileStorage;

use crate::error::Result;

/// Content type of PDF documents.
pub const CONTENT_TYPE_PDF: &str = "application/pdf";

/// Storage backend.
pub trait FileStorage: Send + Sync {
    /// Store `data` for `owner_id` and return its path reference.
    fn save(&self, data: &[u8], file_name: &str, content_type: &str, owner_id: &str) -> Result<String>;

    /// Read the file at `path`.
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Whether a file exists at `path`.
    fn exists(&self, path: &str) -> Result<bool>;

    /// Delete the file at `path`. Deleting a missing file is not an error.
    fn delete(&self, path: &str) -> Result<()>;
}
