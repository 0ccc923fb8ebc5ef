//! Local filesystem storage.
//!
//! Files live at `<root>/<owner>/<yyyy-mm-dd>/<uuid>_<name>`; the returned
//! path reference is relative to the root.

use super::{FileStorage, CONTENT_TYPE_PDF};
use crate::error::{Error, Result};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

/// Stores files under a root directory.
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    root_dir: PathBuf,
}

impl LocalFileStorage {
    /// Create storage rooted at `root_dir`, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        fs::create_dir_all(&root_dir)?;
        Ok(Self { root_dir })
    }

    /// Root directory.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Resolve a path reference, refusing anything that escapes the root.
    fn full_path(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        if path.is_empty() || relative.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(Error::Storage(format!("invalid storage path '{}'", path)));
        }
        Ok(self.root_dir.join(relative))
    }
}

/// Keep a path segment to safe characters.
fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

/// Final file name, with a `.pdf` extension for PDF content.
fn storage_file_name(file_name: &str, content_type: &str) -> String {
    let base = Path::new(file_name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut name = sanitize_segment(&base);
    if content_type == CONTENT_TYPE_PDF && !name.to_ascii_lowercase().ends_with(".pdf") {
        name.push_str(".pdf");
    }
    name
}

impl FileStorage for LocalFileStorage {
    fn save(&self, data: &[u8], file_name: &str, content_type: &str, owner_id: &str) -> Result<String> {
        let day = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let name = format!("{}_{}", Uuid::new_v4(), storage_file_name(file_name, content_type));
        let reference = format!("{}/{}/{}", sanitize_segment(owner_id), day, name);

        let full_path = self.full_path(&reference)?;
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full_path, data)?;

        log::debug!("Stored {} bytes at {}", data.len(), reference);
        Ok(reference)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(path)?;
        fs::read(&full_path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::Storage(format!("file not found: {}", path)),
            _ => Error::Io(e),
        })
    }

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.full_path(path)?.is_file())
    }

    fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path)?;
        match fs::remove_file(&full_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_read_delete() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::new(temp_dir.path()).unwrap();

        let path = storage.save(b"%PDF-1.7", "contract.pdf", CONTENT_TYPE_PDF, "alice").unwrap();
        assert!(path.starts_with("alice/"));
        assert!(path.ends_with("_contract.pdf"));
        assert!(storage.exists(&path).unwrap());
        assert_eq!(storage.read(&path).unwrap(), b"%PDF-1.7");

        storage.delete(&path).unwrap();
        assert!(!storage.exists(&path).unwrap());
        storage.delete(&path).unwrap();
    }

    #[test]
    fn test_pdf_extension_enforced() {
        assert_eq!(storage_file_name("report", CONTENT_TYPE_PDF), "report.pdf");
        assert_eq!(storage_file_name("REPORT.PDF", CONTENT_TYPE_PDF), "REPORT.PDF");
        assert_eq!(storage_file_name("notes", "text/plain"), "notes");
    }

    #[test]
    fn test_names_are_sanitized() {
        assert_eq!(storage_file_name("../../etc/passwd", "text/plain"), "passwd");
        assert_eq!(sanitize_segment("a b/c"), "a_b_c");
        assert_eq!(sanitize_segment(".."), "unnamed");
    }

    #[test]
    fn test_paths_confined_to_root() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::new(temp_dir.path()).unwrap();

        assert!(matches!(storage.read("../outside.pdf"), Err(Error::Storage(_))));
        assert!(matches!(storage.read("/etc/passwd"), Err(Error::Storage(_))));
        assert!(matches!(storage.read(""), Err(Error::Storage(_))));
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::new(temp_dir.path()).unwrap();
        assert!(matches!(storage.read("bob/2024-01-01/x.pdf"), Err(Error::Storage(_))));
    }
}
