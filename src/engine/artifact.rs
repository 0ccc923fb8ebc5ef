//! Scoped temporary files for engine calls.
//!
//! Every engine invocation exchanges data through files in the work
//! directory. Each file is owned by a [`TempArtifact`] that deletes it when
//! dropped, so no artifact outlives the call, including on error paths.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// A file that is removed when the guard goes out of scope.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    should_delete: bool,
}

impl TempArtifact {
    /// Register `path` for cleanup. The file is not created.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            should_delete: true,
        }
    }

    /// Reserve a uniquely named path in `dir`, e.g. `input-<uuid>.bin`.
    pub fn reserve(dir: &Path, stem: &str, extension: &str) -> Self {
        Self::new(dir.join(format!("{}-{}.{}", stem, Uuid::new_v4(), extension)))
    }

    /// Create a uniquely named file in `dir` holding `data`.
    pub fn create(dir: &Path, stem: &str, extension: &str, data: &[u8]) -> io::Result<Self> {
        let artifact = Self::reserve(dir, stem, extension);
        let mut file = fs::OpenOptions::new().write(true).create_new(true).open(&artifact.path)?;
        file.write_all(data)?;
        file.sync_all()?;
        Ok(artifact)
    }

    /// Like [`create`](Self::create), readable only by the owner on Unix.
    pub fn create_private(dir: &Path, stem: &str, extension: &str, data: &[u8]) -> io::Result<Self> {
        let artifact = Self::reserve(dir, stem, extension);
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&artifact.path)?;
        file.write_all(data)?;
        file.sync_all()?;
        Ok(artifact)
    }

    /// Path of the artifact.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete now. Returns `Ok(false)` if the file did not exist.
    pub fn delete(&mut self) -> io::Result<bool> {
        if !self.should_delete {
            return Ok(false);
        }

        match fs::remove_file(&self.path) {
            Ok(_) => {
                self.should_delete = false;
                Ok(true)
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.should_delete = false;
                Ok(false)
            },
            Err(e) => Err(e),
        }
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if self.should_delete {
            if let Err(e) = fs::remove_file(&self.path) {
                if e.kind() != io::ErrorKind::NotFound {
                    log::warn!("Failed to remove engine artifact {}: {}", self.path.display(), e);
                }
            }
        }
    }
}

impl AsRef<Path> for TempArtifact {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let artifact = TempArtifact::create(dir.path(), "input", "bin", b"data").unwrap();
            assert!(artifact.path().exists());
            artifact.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_reserved_path_removed_after_engine_writes_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let artifact = TempArtifact::reserve(dir.path(), "output", "sig");
            fs::write(artifact.path(), b"written by engine").unwrap();
            artifact.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let a = TempArtifact::reserve(dir.path(), "input", "bin");
        let b = TempArtifact::reserve(dir.path(), "input", "bin");
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_manual_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mut artifact = TempArtifact::create(dir.path(), "input", "bin", b"data").unwrap();
        assert!(artifact.delete().unwrap());
        assert!(!artifact.delete().unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_private_artifact_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let artifact = TempArtifact::create_private(dir.path(), "key", "pem", b"secret").unwrap();
        let mode = fs::metadata(artifact.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
