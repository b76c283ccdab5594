//! CLI command implementations.
//!
//! Each submodule implements one `autosnap` command. The binary parses
//! arguments and layers configuration; everything that touches the gateway
//! or the ledger lives here so it can be exercised from tests.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `snapshot` | Snapshot every volume carrying the backup tag |
//! | `prune` | Delete snapshots whose deletion tag has passed |
//! | `run` | `snapshot`, then `prune` |
//! | `ledger list` | Show the most recent ledger entries |
//! | `config --show` | Print the effective configuration |
//!
//! # Example Usage
//!
//! ```bash
//! # Preview a nightly run against a local platform state
//! autosnap --platform-state state.json --dry-run run
//!
//! # Inspect what was recorded
//! autosnap ledger list --limit 20
//! ```

mod config;
mod ledger;
mod run;

pub use config::{ConfigCommand, render_config};
pub use ledger::{LedgerCommand, format_entries};
pub use run::{RunReport, Workflow, execute};
