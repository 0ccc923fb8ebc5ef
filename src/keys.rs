//! On-disk key storage.
//!
//! Each signer gets a directory `<root>/<signer-id>/` holding `public.key`
//! and `private.key` exactly as the engine produced them. The private key is
//! written owner-only on Unix.

use crate::engine::KeyPair;
use crate::error::{Error, Result};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const PUBLIC_KEY_FILE: &str = "public.key";
const PRIVATE_KEY_FILE: &str = "private.key";

/// Per-signer key files under a root directory.
#[derive(Debug, Clone)]
pub struct KeyStore {
    root_dir: PathBuf,
}

impl KeyStore {
    /// Create a key store rooted at `root_dir`. The directory is created lazily.
    pub fn new<P: AsRef<Path>>(root_dir: P) -> Self {
        Self {
            root_dir: root_dir.as_ref().to_path_buf(),
        }
    }

    /// Root directory.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn signer_dir(&self, signer_id: &str) -> Result<PathBuf> {
        let valid = !signer_id.is_empty()
            && signer_id != "."
            && signer_id != ".."
            && signer_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'));
        if !valid {
            return Err(Error::InvalidInput(format!("invalid signer id '{}'", signer_id)));
        }
        Ok(self.root_dir.join(signer_id))
    }

    /// Write the key pair of `signer_id`, replacing any existing keys.
    pub fn save(&self, signer_id: &str, keys: &KeyPair) -> Result<()> {
        let dir = self.signer_dir(signer_id)?;
        fs::create_dir_all(&dir)?;

        fs::write(dir.join(PUBLIC_KEY_FILE), &keys.public_key)?;
        write_private(&dir.join(PRIVATE_KEY_FILE), &keys.private_key)?;

        log::info!("Stored key pair for signer {} in {}", signer_id, dir.display());
        Ok(())
    }

    /// Load the key pair of `signer_id`.
    pub fn load(&self, signer_id: &str) -> Result<KeyPair> {
        let dir = self.signer_dir(signer_id)?;
        let read = |name: &str| {
            fs::read(dir.join(name)).map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => {
                    Error::RecordNotFound(format!("no {} for signer {}", name, signer_id))
                },
                _ => Error::Io(e),
            })
        };
        Ok(KeyPair::new(read(PUBLIC_KEY_FILE)?, read(PRIVATE_KEY_FILE)?))
    }

    /// Whether both key files of `signer_id` exist.
    pub fn exists(&self, signer_id: &str) -> Result<bool> {
        let dir = self.signer_dir(signer_id)?;
        Ok(dir.join(PUBLIC_KEY_FILE).is_file() && dir.join(PRIVATE_KEY_FILE).is_file())
    }

    /// Delete the keys of `signer_id`. Missing keys are not an error.
    pub fn delete(&self, signer_id: &str) -> Result<()> {
        let dir = self.signer_dir(signer_id)?;
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

fn write_private(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()
}
