//! `ledger` command.

#![allow(clippy::print_stdout)]

use crate::Result;
use crate::ledger::{LedgerEntry, SnapshotLedger, SqliteLedger};
use std::fmt::Write as _;
use std::path::Path;

/// Default number of entries shown by `ledger list`.
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// `ledger` command handler.
#[derive(Debug, Clone, Copy)]
pub struct LedgerCommand {
    limit: usize,
}

impl LedgerCommand {
    /// Creates a `ledger list` command showing up to `limit` entries.
    #[must_use]
    pub const fn list(limit: usize) -> Self {
        Self { limit }
    }

    /// Prints the newest entries of the ledger at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be opened or read.
    pub async fn execute(self, path: &Path) -> Result<()> {
        let ledger = SqliteLedger::new(path)?;
        let entries = ledger.list(self.limit).await?;
        print!("{}", format_entries(&entries));
        Ok(())
    }
}

impl Default for LedgerCommand {
    fn default() -> Self {
        Self::list(DEFAULT_LIST_LIMIT)
    }
}

/// Formats ledger entries as an aligned table.
#[must_use]
pub fn format_entries(entries: &[LedgerEntry]) -> String {
    if entries.is_empty() {
        return "No snapshots recorded\n".to_string();
    }

    let volume_width = entries
        .iter()
        .map(|e| e.resource().as_str().len())
        .max()
        .unwrap_or(0)
        .max("VOLUME".len());

    let mut out = String::new();
    let _ = writeln!(out, "{:<17}  {:<volume_width$}  SNAPSHOT", "CREATED", "VOLUME");
    for entry in entries {
        let _ = writeln!(
            out,
            "{:<17}  {:<volume_width$}  {}",
            entry.created_at().format("%Y-%m-%dT%H:%MZ"),
            entry.resource(),
            entry.snapshot_id()
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SnapshotId, VolumeId};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_format_empty() {
        assert_eq!(format_entries(&[]), "No snapshots recorded\n");
    }

    #[test]
    fn test_format_entries_aligned() {
        let at = Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 45)
            .single()
            .expect("valid date");
        let entries = vec![
            LedgerEntry::new(VolumeId::new("vol-1"), SnapshotId::new("snap-1"), at),
            LedgerEntry::new(VolumeId::new("vol-0abc"), SnapshotId::new("snap-2"), at),
        ];

        let table = format_entries(&entries);
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines[0], "CREATED            VOLUME    SNAPSHOT");
        assert_eq!(lines[1], "2024-05-01T12:00Z  vol-1     snap-1");
        assert_eq!(lines[2], "2024-05-01T12:00Z  vol-0abc  snap-2");
    }

    #[tokio::test]
    async fn test_execute_reads_existing_ledger() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ledger.db");
        let ledger = SqliteLedger::new(&path).expect("ledger");
        ledger
            .store(&LedgerEntry::new(
                VolumeId::new("vol-1"),
                SnapshotId::new("snap-1"),
                Utc::now(),
            ))
            .await
            .expect("store");

        LedgerCommand::list(10).execute(&path).await.expect("list");
    }
}
