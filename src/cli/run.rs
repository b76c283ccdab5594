//! `snapshot`, `prune` and `run` commands.

#![allow(clippy::print_stdout)]

use crate::config::AutosnapConfig;
use crate::gateway::{InMemoryControlPlane, PlatformGateway, ResourceGateway};
use crate::ledger::{SnapshotLedger, SqliteLedger};
use crate::manager::{ManagerOptions, PruneRunResult, SnapshotManager, SnapshotRunResult};
use crate::{Error, Result};
use std::future::Future;
use std::path::Path;
use tracing::{error, info, warn};

/// Which workflows a command runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workflow {
    /// Snapshot only.
    Snapshot,
    /// Prune only.
    Prune,
    /// Snapshot, then prune.
    Both,
}

impl Workflow {
    const fn snapshots(self) -> bool {
        matches!(self, Self::Snapshot | Self::Both)
    }

    const fn prunes(self) -> bool {
        matches!(self, Self::Prune | Self::Both)
    }
}

/// Results of the workflows a command ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Snapshot workflow result, if it ran.
    pub snapshot: Option<SnapshotRunResult>,
    /// Prune workflow result, if it ran.
    pub prune: Option<PruneRunResult>,
}

/// Runs `workflow` against the configured platform state and ledger.
///
/// `shutdown` completing cancels the run; in-flight work for the current
/// resource is abandoned. The platform state is written back afterwards
/// unless this is a dry run, including after a cancellation.
///
/// # Errors
///
/// Returns an error if no platform state is configured, the state or ledger
/// cannot be opened, a listing fails, the run is cancelled, or the state
/// cannot be saved.
pub async fn execute<F>(config: &AutosnapConfig, workflow: Workflow, shutdown: F) -> Result<RunReport>
where
    F: Future<Output = ()>,
{
    let Some(state_path) = config.platform_state.as_deref() else {
        return Err(Error::InvalidInput(
            "no platform state configured; pass --platform-state or set AUTOSNAP_PLATFORM_STATE"
                .to_string(),
        ));
    };

    let plane = InMemoryControlPlane::load(state_path)?.with_page_size(config.page_size);
    let gateway = PlatformGateway::new(plane, &config.tags);
    let ledger = SqliteLedger::new(&config.ledger_path)?;
    let manager = SnapshotManager::new(gateway, ledger, ManagerOptions::from_config(config));

    let mut report = RunReport::default();
    let outcome = tokio::select! {
        biased;
        () = shutdown => {
            warn!("Interrupted, abandoning run");
            Err(Error::OperationFailed {
                operation: "run".to_string(),
                cause: "interrupted".to_string(),
            })
        },
        result = run_workflows(&manager, workflow, &mut report) => result,
    };

    if !config.dry_run {
        save_state(manager.gateway().control_plane(), state_path)?;
    }

    outcome.map(|()| report)
}

/// Runs the selected workflows in order.
///
/// A failed Snapshot run does not stop Prune; the first error is returned
/// once both have been attempted.
async fn run_workflows<G: ResourceGateway, L: SnapshotLedger>(
    manager: &SnapshotManager<G, L>,
    workflow: Workflow,
    report: &mut RunReport,
) -> Result<()> {
    let mut first_error = None;

    if workflow.snapshots() {
        match manager.snapshot().await {
            Ok(result) => {
                println!("{}", result.summary());
                report.snapshot = Some(result);
            },
            Err(e) => {
                error!(error = %e, "Snapshot workflow failed");
                first_error = Some(e);
            },
        }
    }
    if workflow.prunes() {
        match manager.prune().await {
            Ok(result) => {
                println!("{}", result.summary());
                report.prune = Some(result);
            },
            Err(e) => {
                error!(error = %e, "Prune workflow failed");
                first_error.get_or_insert(e);
            },
        }
    }

    first_error.map_or(Ok(()), Err)
}

fn save_state(plane: &InMemoryControlPlane, path: &Path) -> Result<()> {
    plane.save(path)?;
    info!(path = %path.display(), "Saved platform state");
    Ok(())
}
