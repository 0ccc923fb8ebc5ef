//! Repository persisted as a JSON array on disk.
//!
//! `save_changes` writes the full record set to a sibling temporary file and
//! renames it over the target, so a crash never leaves a half-written file.

use super::{
    check_duplicate, poisoned, select_document, select_signature, select_time_window, SignatureRecord,
    SignatureRepository,
};
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
struct State {
    committed: Vec<SignatureRecord>,
    staged: Vec<SignatureRecord>,
}

/// Durable repository backed by a single JSON file.
#[derive(Debug)]
pub struct JsonFileRepository {
    path: PathBuf,
    state: Mutex<State>,
}

impl JsonFileRepository {
    /// Open the repository at `path`. A missing file is an empty repository.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let committed = if path.exists() {
            let text = fs::read_to_string(&path)?;
            if text.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&text)?
            }
        } else {
            Vec::new()
        };

        log::debug!("Opened record repository {} ({} records)", path.display(), committed.len());
        Ok(Self {
            path,
            state: Mutex::new(State {
                committed,
                staged: Vec::new(),
            }),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomically(&self, records: &[SignatureRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let json = serde_json::to_vec_pretty(records)?;
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        Ok(())
    }
}

impl SignatureRepository for JsonFileRepository {
    fn add_document(&self, record: SignatureRecord) -> Result<()> {
        record.validate()?;
        let mut state = self.state.lock().map_err(poisoned)?;
        check_duplicate(&state.committed, &record)?;
        check_duplicate(&state.staged, &record)?;
        state.staged.push(record);
        Ok(())
    }

    fn get_by_document_id(&self, document_id: &str) -> Result<Vec<SignatureRecord>> {
        let state = self.state.lock().map_err(poisoned)?;
        Ok(select_document(&state.committed, document_id))
    }

    fn find_signature(&self, document_id: &str, order: u32) -> Result<Option<SignatureRecord>> {
        let state = self.state.lock().map_err(poisoned)?;
        Ok(select_signature(&state.committed, document_id, order))
    }

    fn get_by_signer_and_time_window(
        &self,
        signer_id: &str,
        at: DateTime<Utc>,
        tolerance: Duration,
    ) -> Result<Option<SignatureRecord>> {
        let state = self.state.lock().map_err(poisoned)?;
        Ok(select_time_window(&state.committed, signer_id, at, tolerance))
    }

    fn save_changes(&self) -> Result<()> {
        let mut state = self.state.lock().map_err(poisoned)?;
        if state.staged.is_empty() {
            return Ok(());
        }

        let mut merged = state.committed.clone();
        merged.extend(state.staged.iter().cloned());
        self.write_atomically(&merged)?;

        log::info!("Committed {} signature record(s) to {}", state.staged.len(), self.path.display());
        state.committed = merged;
        state.staged.clear();
        Ok(())
    }

    fn discard_changes(&self) -> Result<()> {
        let mut state = self.state.lock().map_err(poisoned)?;
        state.staged.clear();
        Ok(())
    }
}
