//! In-memory repository.

use super::{
    check_duplicate, poisoned, select_document, select_signature, select_time_window, SignatureRecord,
    SignatureRepository,
};
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
struct State {
    committed: Vec<SignatureRecord>,
    staged: Vec<SignatureRecord>,
}

/// Repository holding records in process memory.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: Mutex<State>,
}

impl InMemoryRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed records.
    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.committed.len()).unwrap_or(0)
    }

    /// Whether no records are committed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of staged, uncommitted records.
    pub fn pending(&self) -> usize {
        self.state.lock().map(|s| s.staged.len()).unwrap_or(0)
    }
}

impl SignatureRepository for InMemoryRepository {
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
        let staged = std::mem::take(&mut state.staged);
        state.committed.extend(staged);
        Ok(())
    }

    fn discard_changes(&self) -> Result<()> {
        let mut state = self.state.lock().map_err(poisoned)?;
        state.staged.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::record;
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_staged_records_invisible_until_saved() {
        let repo = InMemoryRepository::new();
        repo.add_document(record("doc", 1, 0)).unwrap();

        assert!(repo.find_signature("doc", 1).unwrap().is_none());
        assert_eq!(repo.pending(), 1);

        repo.save_changes().unwrap();
        assert!(repo.find_signature("doc", 1).unwrap().is_some());
        assert_eq!(repo.len(), 1);
        assert_eq!(repo.pending(), 0);
    }

    #[test]
    fn test_discard_changes() {
        let repo = InMemoryRepository::new();
        repo.add_document(record("doc", 1, 0)).unwrap();
        repo.discard_changes().unwrap();
        repo.save_changes().unwrap();
        assert!(repo.is_empty());
    }

    #[test]
    fn test_duplicate_rejected() {
        let repo = InMemoryRepository::new();
        repo.add_document(record("doc", 1, 0)).unwrap();
        repo.save_changes().unwrap();

        let mut again = record("doc", 1, 5);
        again.id = "other".to_string();
        assert!(matches!(repo.add_document(again), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_get_by_document_id() {
        let repo = InMemoryRepository::new();
        repo.add_document(record("doc", 2, 0)).unwrap();
        repo.add_document(record("doc", 1, 0)).unwrap();
        repo.add_document(record("other", 1, 0)).unwrap();
        repo.save_changes().unwrap();

        let records = repo.get_by_document_id("doc").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].order, 1);
    }
}
