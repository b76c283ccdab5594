//! In-memory control plane.
//!
//! Holds volumes and snapshots in process memory and answers requests the
//! way the platform does: tag-key filters match case-sensitively, listings
//! are paginated with an opaque token, and `create_tags` overwrites values
//! of existing keys. The state can be loaded from and saved to a JSON
//! platform-state file.
//!
//! Failures can be injected per request for exercising the workflows'
//! skip-and-continue paths.

use super::control_plane::{
    ControlPlane, DescribeRequest, Filter, Page, SnapshotRecord, TAG_KEY_FILTER, VolumeRecord,
};
use crate::locks::acquire_lock;
use crate::models::{SnapshotId, Tag, VolumeId};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// Default number of records per describe page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Serializable platform inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformState {
    /// Volumes, in listing order.
    #[serde(default)]
    pub volumes: Vec<VolumeRecord>,
    /// Snapshots, in listing order.
    #[serde(default)]
    pub snapshots: Vec<SnapshotRecord>,
}

impl PlatformState {
    /// Loads a platform state from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_platform_state".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            Error::InvalidInput(format!("platform state {}: {e}", path.display()))
        })
    }

    /// Writes the platform state to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| Error::failed("serialize_platform_state", e))?;
        std::fs::write(path, contents).map_err(|e| Error::OperationFailed {
            operation: "write_platform_state".to_string(),
            cause: format!("{}: {e}", path.display()),
        })
    }
}

#[derive(Debug, Default)]
struct Faults {
    volume_page: Option<usize>,
    snapshot_page: Option<usize>,
    create_for: HashSet<String>,
    tags_for: HashSet<String>,
    delete_for: HashSet<String>,
    tag_everything: bool,
    empty_snapshot_ids: bool,
    create_delay: HashMap<String, Duration>,
}

/// Control plane backed by process memory.
pub struct InMemoryControlPlane {
    state: Mutex<PlatformState>,
    faults: Mutex<Faults>,
    page_size: usize,
}

impl InMemoryControlPlane {
    /// Creates an empty control plane.
    #[must_use]
    pub fn new() -> Self {
        Self::from_state(PlatformState::default())
    }

    /// Creates a control plane serving the given state.
    #[must_use]
    pub fn from_state(state: PlatformState) -> Self {
        Self {
            state: Mutex::new(state),
            faults: Mutex::new(Faults::default()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Creates a control plane from a JSON platform-state file.
    pub fn load(path: &Path) -> Result<Self> {
        PlatformState::load(path).map(Self::from_state)
    }

    /// Sets the number of records per describe page (minimum 1).
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Returns a copy of the current state.
    #[must_use]
    pub fn state(&self) -> PlatformState {
        acquire_lock(&self.state).clone()
    }

    /// Writes the current state to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.state().save(path)
    }

    /// Appends a volume.
    pub fn add_volume(&self, volume: VolumeRecord) {
        acquire_lock(&self.state).volumes.push(volume);
    }

    /// Appends a snapshot.
    pub fn add_snapshot(&self, snapshot: SnapshotRecord) {
        acquire_lock(&self.state).snapshots.push(snapshot);
    }

    /// Returns a copy of all snapshots.
    #[must_use]
    pub fn snapshots(&self) -> Vec<SnapshotRecord> {
        acquire_lock(&self.state).snapshots.clone()
    }

    /// Returns the snapshot with the given ID, if present.
    #[must_use]
    pub fn snapshot(&self, snapshot_id: &str) -> Option<SnapshotRecord> {
        acquire_lock(&self.state)
            .snapshots
            .iter()
            .find(|s| s.snapshot_id.as_deref() == Some(snapshot_id))
            .cloned()
    }

    /// Fails the describe-volumes request for the zero-based page `page`.
    pub fn fail_volume_page(&self, page: usize) {
        acquire_lock(&self.faults).volume_page = Some(page);
    }

    /// Fails the describe-snapshots request for the zero-based page `page`.
    pub fn fail_snapshot_page(&self, page: usize) {
        acquire_lock(&self.faults).snapshot_page = Some(page);
    }

    /// Fails snapshot creation for a volume.
    pub fn fail_create_for(&self, volume_id: &str) {
        acquire_lock(&self.faults)
            .create_for
            .insert(volume_id.to_string());
    }

    /// Fails tagging of a resource.
    pub fn fail_tags_for(&self, resource_id: &str) {
        acquire_lock(&self.faults)
            .tags_for
            .insert(resource_id.to_string());
    }

    /// Fails every tagging request.
    pub fn fail_all_tags(&self) {
        acquire_lock(&self.faults).tag_everything = true;
    }

    /// Fails deletion of a snapshot.
    pub fn fail_delete_for(&self, snapshot_id: &str) {
        acquire_lock(&self.faults)
            .delete_for
            .insert(snapshot_id.to_string());
    }

    /// Makes snapshot creation report no snapshot ID.
    pub fn return_empty_snapshot_ids(&self) {
        acquire_lock(&self.faults).empty_snapshot_ids = true;
    }

    /// Delays snapshot creation for `volume_id` by `delay`.
    pub fn delay_create_for(&self, volume_id: &str, delay: Duration) {
        acquire_lock(&self.faults)
            .create_delay
            .insert(volume_id.to_string(), delay);
    }

    fn page_of<T: Clone>(&self, matching: &[T], request: &DescribeRequest) -> Result<Page<T>> {
        let offset = match request.next_token.as_deref() {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| Error::platform("describe", format!("invalid next token '{token}'")))?,
            None => 0,
        };
        let end = (offset + self.page_size).min(matching.len());
        let items = matching.get(offset..end).unwrap_or_default().to_vec();
        let next_token = (end < matching.len()).then(|| end.to_string());
        Ok(Page { items, next_token })
    }

    fn page_index(&self, request: &DescribeRequest) -> usize {
        request
            .next_token
            .as_deref()
            .and_then(|token| token.parse::<usize>().ok())
            .map_or(0, |offset| offset / self.page_size)
    }
}

impl Default for InMemoryControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns `true` if `tags` satisfy every filter.
fn matches_filters(tags: &[Tag], filters: &[Filter], operation: &str) -> Result<bool> {
    for filter in filters {
        if filter.name != TAG_KEY_FILTER {
            return Err(Error::platform(
                operation,
                format!("unsupported filter '{}'", filter.name),
            ));
        }
        let matched = tags
            .iter()
            .any(|tag| filter.values.iter().any(|value| *value == tag.key));
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

#[async_trait]
impl ControlPlane for InMemoryControlPlane {
    async fn describe_volumes(&self, request: &DescribeRequest) -> Result<Page<VolumeRecord>> {
        if acquire_lock(&self.faults).volume_page == Some(self.page_index(request)) {
            return Err(Error::platform(
                "describe_volumes",
                "RequestLimitExceeded: request limit exceeded",
            ));
        }

        let state = acquire_lock(&self.state);
        let mut matching = Vec::new();
        for volume in &state.volumes {
            if matches_filters(&volume.tags, &request.filters, "describe_volumes")? {
                matching.push(volume.clone());
            }
        }
        self.page_of(&matching, request)
    }

    async fn describe_snapshots(
        &self,
        request: &DescribeRequest,
    ) -> Result<Page<SnapshotRecord>> {
        if acquire_lock(&self.faults).snapshot_page == Some(self.page_index(request)) {
            return Err(Error::platform(
                "describe_snapshots",
                "RequestLimitExceeded: request limit exceeded",
            ));
        }

        let state = acquire_lock(&self.state);
        let mut matching = Vec::new();
        for snapshot in &state.snapshots {
            if matches_filters(&snapshot.tags, &request.filters, "describe_snapshots")? {
                matching.push(snapshot.clone());
            }
        }
        self.page_of(&matching, request)
    }

    async fn create_snapshot(
        &self,
        volume_id: &VolumeId,
        description: &str,
    ) -> Result<SnapshotRecord> {
        let (delay, fail, empty_id) = {
            let faults = acquire_lock(&self.faults);
            (
                faults.create_delay.get(volume_id.as_str()).copied(),
                faults.create_for.contains(volume_id.as_str()),
                faults.empty_snapshot_ids,
            )
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(Error::platform(
                "create_snapshot",
                format!("IncorrectState: volume '{volume_id}' is busy"),
            ));
        }

        let mut state = acquire_lock(&self.state);
        let known = state
            .volumes
            .iter()
            .any(|v| v.volume_id.as_deref() == Some(volume_id.as_str()));
        if !known {
            return Err(Error::platform(
                "create_snapshot",
                format!("InvalidVolume.NotFound: volume '{volume_id}' does not exist"),
            ));
        }

        let record = SnapshotRecord {
            snapshot_id: Some(format!("snap-{}", Uuid::new_v4().simple())),
            volume_id: Some(volume_id.to_string()),
            start_time: Some(Utc::now()),
            description: Some(description.to_string()),
            tags: Vec::new(),
        };
        state.snapshots.push(record.clone());

        if empty_id {
            return Ok(SnapshotRecord {
                snapshot_id: None,
                ..record
            });
        }
        Ok(record)
    }

    async fn create_tags(&self, resource_id: &str, tags: &[Tag]) -> Result<()> {
        {
            let faults = acquire_lock(&self.faults);
            if faults.tag_everything || faults.tags_for.contains(resource_id) {
                return Err(Error::platform(
                    "create_tags",
                    format!("TagLimitExceeded: cannot tag '{resource_id}'"),
                ));
            }
        }

        let mut state = acquire_lock(&self.state);
        let PlatformState { volumes, snapshots } = &mut *state;
        let existing = if let Some(snapshot) = snapshots
            .iter_mut()
            .find(|s| s.snapshot_id.as_deref() == Some(resource_id))
        {
            &mut snapshot.tags
        } else if let Some(volume) = volumes
            .iter_mut()
            .find(|v| v.volume_id.as_deref() == Some(resource_id))
        {
            &mut volume.tags
        } else {
            return Err(Error::platform(
                "create_tags",
                format!("InvalidID: resource '{resource_id}' does not exist"),
            ));
        };

        for tag in tags {
            match existing.iter_mut().find(|t| t.key == tag.key) {
                Some(current) => current.value.clone_from(&tag.value),
                None => existing.push(tag.clone()),
            }
        }
        Ok(())
    }

    async fn delete_snapshot(&self, snapshot_id: &SnapshotId) -> Result<()> {
        if acquire_lock(&self.faults)
            .delete_for
            .contains(snapshot_id.as_str())
        {
            return Err(Error::platform(
                "delete_snapshot",
                format!("InvalidSnapshot.InUse: snapshot '{snapshot_id}' is in use"),
            ));
        }

        let mut state = acquire_lock(&self.state);
        let before = state.snapshots.len();
        state
            .snapshots
            .retain(|s| s.snapshot_id.as_deref() != Some(snapshot_id.as_str()));
        if state.snapshots.len() == before {
            return Err(Error::platform(
                "delete_snapshot",
                format!("InvalidSnapshot.NotFound: snapshot '{snapshot_id}' does not exist"),
            ));
        }
        Ok(())
    }
}
