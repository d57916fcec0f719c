use super::entry::{LedgerEntry, LedgerKey};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Keyed storage for ledger counters with conditional writes
///
/// Implementations must make `compare_and_swap` atomic: the write happens only
/// if the stored version still equals `expected_version` (`None` = absent).
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn load(&self, key: &LedgerKey) -> Result<Option<LedgerEntry>, StoreError>;

    /// Returns `Ok(false)` when another writer got there first
    async fn compare_and_swap(
        &self,
        key: &LedgerKey,
        expected_version: Option<u64>,
        entry: LedgerEntry,
    ) -> Result<bool, StoreError>;

    /// Entries that still hold at least one open reservation
    async fn list_open(&self) -> Result<Vec<(LedgerKey, LedgerEntry)>, StoreError>;
}

/// In-process ledger store
#[derive(Default)]
pub struct MemoryLedgerStore {
    entries: Mutex<HashMap<LedgerKey, LedgerEntry>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn load(&self, key: &LedgerKey) -> Result<Option<LedgerEntry>, StoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Unavailable("ledger lock poisoned".into()))?;
        Ok(entries.get(key).cloned())
    }

    async fn compare_and_swap(
        &self,
        key: &LedgerKey,
        expected_version: Option<u64>,
        mut entry: LedgerEntry,
    ) -> Result<bool, StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Unavailable("ledger lock poisoned".into()))?;

        let current_version = entries.get(key).map(|e| e.version);
        if current_version != expected_version {
            return Ok(false);
        }

        entry.version = current_version.map_or(1, |v| v + 1);
        entries.insert(key.clone(), entry);
        Ok(true)
    }

    async fn list_open(&self) -> Result<Vec<(LedgerKey, LedgerEntry)>, StoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Unavailable("ledger lock poisoned".into()))?;
        Ok(entries
            .iter()
            .filter(|(_, e)| !e.open.is_empty())
            .map(|(k, e)| (k.clone(), e.clone()))
            .collect())
    }
}
