//! # Autosnap
//!
//! Tag-driven lifecycle management for block-storage snapshots.
//!
//! Autosnap discovers volumes carrying a backup tag, snapshots them with a
//! per-volume retention period baked into a deletion tag, and later deletes
//! the snapshots whose deletion time has passed. It is a batch job: each
//! invocation runs a workflow to completion and exits.
//!
//! ## Layers
//!
//! - [`policy`]: pure tag decisions (eligibility, retention, expiration)
//! - [`gateway`]: paginated, filtered access to the control plane
//! - [`ledger`]: durable record of the snapshots this tool created
//! - [`manager`]: the Snapshot and Prune workflows
//!
//! ## Example
//!
//! ```rust,ignore
//! use autosnap::gateway::{InMemoryControlPlane, PlatformGateway};
//! use autosnap::ledger::SqliteLedger;
//! use autosnap::manager::{ManagerOptions, SnapshotManager};
//!
//! let gateway = PlatformGateway::new(InMemoryControlPlane::new(), &tag_keys);
//! let ledger = SqliteLedger::new("ledger.db")?;
//! let manager = SnapshotManager::new(gateway, ledger, ManagerOptions::default());
//!
//! let created = manager.snapshot().await?;
//! let pruned = manager.prune().await?;
//! println!("{}\n{}", created.summary(), pruned.summary());
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use std::time::Duration;
use thiserror::Error as ThisError;

// Module declarations
pub mod cli;
pub mod config;
pub mod gateway;
pub mod ledger;
mod locks;
pub mod manager;
pub mod models;
pub mod observability;
pub mod policy;

// Re-exports for convenience
pub use config::{AutosnapConfig, TagKeys};
pub use gateway::{ControlPlane, PlatformGateway, ResourceGateway};
pub use ledger::{LedgerEntry, SnapshotLedger};
pub use manager::{ManagerOptions, PruneRunResult, SnapshotManager, SnapshotRunResult};
pub use models::{Snapshot, SnapshotId, Tag, Volume, VolumeId};

/// Error type for autosnap operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Bad configuration values, malformed platform-state files |
/// | `OperationFailed` | Local I/O, observability setup, serialization |
/// | `Platform` | Any control-plane request fails |
/// | `Ledger` | The snapshot ledger cannot be opened, written, or read |
/// | `Timeout` | A per-resource deadline elapses |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A local operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A control-plane request failed.
    ///
    /// Raised when:
    /// - A describe page cannot be fetched (fatal to the listing call)
    /// - Creating, tagging, or deleting a snapshot is rejected
    #[error("platform request '{operation}' failed: {cause}")]
    Platform {
        /// The control-plane request that failed.
        operation: String,
        /// The error reported by the platform.
        cause: String,
    },

    /// A snapshot ledger operation failed.
    #[error("ledger '{operation}' failed: {cause}")]
    Ledger {
        /// The ledger operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A deadline elapsed before the operation completed.
    #[error("'{operation}' timed out after {after:?}")]
    Timeout {
        /// The operation that was abandoned.
        operation: String,
        /// The deadline that elapsed.
        after: Duration,
    },
}

impl Error {
    /// Builds a [`Error::Platform`] from any displayable cause.
    pub fn platform(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::Platform {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }

    /// Builds a [`Error::Ledger`] from any displayable cause.
    pub fn ledger(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::Ledger {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }

    /// Builds a [`Error::OperationFailed`] from any displayable cause.
    pub fn failed(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for autosnap operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::platform("create_snapshot", "throttled");
        assert_eq!(
            err.to_string(),
            "platform request 'create_snapshot' failed: throttled"
        );

        let err = Error::ledger("store", "disk full");
        assert_eq!(err.to_string(), "ledger 'store' failed: disk full");

        let err = Error::Timeout {
            operation: "snapshot_volume".to_string(),
            after: Duration::from_secs(300),
        };
        assert_eq!(err.to_string(), "'snapshot_volume' timed out after 300s");
    }
}
