//! In-memory ledger.

use super::{LedgerEntry, SnapshotLedger, record_operation_metrics};
use crate::locks::acquire_lock;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Ledger held in process memory.
///
/// Used by tests and dry runs. Writes can be made to fail to exercise the
/// workflows' ledger-failure handling.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    entries: Mutex<BTreeSet<LedgerEntry>>,
    fail_writes: AtomicBool,
}

impl InMemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent store and delete fail.
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::Relaxed);
    }

    /// Returns a snapshot of all entries in key order.
    #[must_use]
    pub fn entries(&self) -> Vec<LedgerEntry> {
        acquire_lock(&self.entries).iter().cloned().collect()
    }

    /// Returns `true` if the entry is recorded.
    #[must_use]
    pub fn contains(&self, entry: &LedgerEntry) -> bool {
        acquire_lock(&self.entries).contains(entry)
    }

    fn check_writable(&self, operation: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(Error::ledger(operation, "ledger is read-only"));
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotLedger for InMemoryLedger {
    async fn store(&self, entry: &LedgerEntry) -> Result<()> {
        let start = Instant::now();
        let result = self
            .check_writable("store")
            .map(|()| {
                acquire_lock(&self.entries).insert(entry.clone());
            });
        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("memory", "store", start, status);
        result
    }

    async fn delete(&self, entry: &LedgerEntry) -> Result<bool> {
        let start = Instant::now();
        let result = self
            .check_writable("delete")
            .map(|()| acquire_lock(&self.entries).remove(entry));
        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("memory", "delete", start, status);
        result
    }

    async fn list(&self, limit: usize) -> Result<Vec<LedgerEntry>> {
        let mut entries = self.entries();
        entries.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        entries.truncate(limit);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SnapshotId, VolumeId};
    use chrono::Utc;

    fn entry(snapshot: &str) -> LedgerEntry {
        LedgerEntry::new(VolumeId::new("vol-1"), SnapshotId::new(snapshot), Utc::now())
    }

    #[tokio::test]
    async fn test_store_and_delete() {
        let ledger = InMemoryLedger::new();
        let entry = entry("snap-1");

        ledger.store(&entry).await.expect("store");
        ledger.store(&entry).await.expect("store twice");
        assert_eq!(ledger.entries().len(), 1);

        assert!(ledger.delete(&entry).await.expect("delete"));
        assert!(!ledger.delete(&entry).await.expect("delete again"));
        assert!(ledger.entries().is_empty());
    }

    #[tokio::test]
    async fn test_failing_writes() {
        let ledger = InMemoryLedger::new();
        ledger.fail_writes();

        assert!(matches!(
            ledger.store(&entry("snap-1")).await,
            Err(Error::Ledger { .. })
        ));
        assert!(ledger.delete(&entry("snap-1")).await.is_err());
    }
}
