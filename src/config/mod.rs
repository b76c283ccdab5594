//! Configuration management.
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then `AUTOSNAP_*` environment variables, then command-line flags (applied
//! by the binary).
//!
//! ```toml
//! [tags]
//! backup = "backup"
//! retention = "retention"
//! delete_after = "_DELETE_AFTER"
//!
//! [snapshot]
//! suffix = "auto-snapshot"
//! default_retention_days = 7
//! resource_timeout_secs = 300
//!
//! [ledger]
//! path = "/var/lib/autosnap/ledger.db"
//!
//! [logging]
//! format = "json"
//!
//! [metrics]
//! enabled = true
//! push_gateway = { endpoint = "http://pushgateway:9091/metrics/job/autosnap" }
//! ```

use crate::policy::{DEFAULT_RETENTION_DAYS, MAX_DEFAULT_RETENTION_DAYS};
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default backup tag key.
pub const DEFAULT_BACKUP_TAG: &str = "backup";
/// Default retention tag key.
pub const DEFAULT_RETENTION_TAG: &str = "retention";
/// Default delete-after tag key.
pub const DEFAULT_DELETE_AFTER_TAG: &str = "_DELETE_AFTER";
/// Default snapshot name suffix.
pub const DEFAULT_SNAPSHOT_SUFFIX: &str = "auto-snapshot";
/// Description given to every snapshot autosnap creates.
pub const DEFAULT_DESCRIPTION: &str = "auto snapshot created by autosnap";
/// Default per-volume deadline.
pub const DEFAULT_RESOURCE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "AUTOSNAP_CONFIG_PATH";

/// Tag keys that drive the workflows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagKeys {
    /// Marks a volume for backup.
    pub backup: String,
    /// Per-volume retention override, in days.
    pub retention: String,
    /// Deletion threshold stamped on created snapshots.
    pub delete_after: String,
}

impl Default for TagKeys {
    fn default() -> Self {
        Self {
            backup: DEFAULT_BACKUP_TAG.to_string(),
            retention: DEFAULT_RETENTION_TAG.to_string(),
            delete_after: DEFAULT_DELETE_AFTER_TAG.to_string(),
        }
    }
}

/// Snapshot creation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSettings {
    /// Suffix appended to generated snapshot names.
    pub suffix: String,
    /// Description passed to the platform on creation.
    pub description: String,
    /// Retention used when a volume has no usable retention tag.
    pub default_retention_days: u32,
    /// Deadline for creating, tagging and recording one volume's snapshot.
    pub resource_timeout: Duration,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            suffix: DEFAULT_SNAPSHOT_SUFFIX.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            default_retention_days: DEFAULT_RETENTION_DAYS,
            resource_timeout: DEFAULT_RESOURCE_TIMEOUT,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name; unknown names yield `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" | "text" => Some(Self::Pretty),
            _ => None,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Output format.
    pub format: LogFormat,
    /// `EnvFilter` directive, e.g. `autosnap=debug`.
    pub filter: Option<String>,
    /// Append log output to this file instead of stderr.
    pub file: Option<PathBuf>,
}

/// Prometheus push gateway settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushGatewaySettings {
    /// Push gateway endpoint URI.
    pub endpoint: String,
    /// Optional username for basic auth.
    pub username: Option<String>,
    /// Optional password for basic auth.
    pub password: Option<String>,
    /// Whether to use HTTP POST instead of PUT.
    pub use_http_post: bool,
}

/// Metrics settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSettings {
    /// Whether metrics are recorded at all.
    pub enabled: bool,
    /// Where to push metrics at exit.
    pub push_gateway: Option<PushGatewaySettings>,
}

/// Main configuration for autosnap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutosnapConfig {
    /// Tag keys.
    pub tags: TagKeys,
    /// Snapshot creation settings.
    pub snapshot: SnapshotSettings,
    /// SQLite ledger location.
    pub ledger_path: PathBuf,
    /// JSON platform-state file served by the in-memory control plane.
    pub platform_state: Option<PathBuf>,
    /// Page size for describe requests.
    pub page_size: usize,
    /// Report what would happen without mutating anything.
    pub dry_run: bool,
    /// Logging settings.
    pub logging: LoggingSettings,
    /// Metrics settings.
    pub metrics: MetricsSettings,
}

impl Default for AutosnapConfig {
    fn default() -> Self {
        Self {
            tags: TagKeys::default(),
            snapshot: SnapshotSettings::default(),
            ledger_path: default_ledger_path(),
            platform_state: None,
            page_size: crate::gateway::DEFAULT_PAGE_SIZE,
            dry_run: false,
            logging: LoggingSettings::default(),
            metrics: MetricsSettings::default(),
        }
    }
}

/// Returns the default ledger location.
///
/// Uses the platform data directory when one exists, `.autosnap/` otherwise.
#[must_use]
pub fn default_ledger_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "autosnap").map_or_else(
        || PathBuf::from(".autosnap").join("ledger.db"),
        |dirs| dirs.data_dir().join("ledger.db"),
    )
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Tag keys.
    pub tags: Option<ConfigFileTags>,
    /// Snapshot settings.
    pub snapshot: Option<ConfigFileSnapshot>,
    /// Ledger settings.
    pub ledger: Option<ConfigFileLedger>,
    /// Platform settings.
    pub platform: Option<ConfigFilePlatform>,
    /// Logging settings.
    pub logging: Option<ConfigFileLogging>,
    /// Metrics settings.
    pub metrics: Option<ConfigFileMetrics>,
}

/// `[tags]` section.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileTags {
    /// Backup tag key.
    pub backup: Option<String>,
    /// Retention tag key.
    pub retention: Option<String>,
    /// Delete-after tag key.
    pub delete_after: Option<String>,
}

/// `[snapshot]` section.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileSnapshot {
    /// Name suffix.
    pub suffix: Option<String>,
    /// Snapshot description.
    pub description: Option<String>,
    /// Default retention in days.
    pub default_retention_days: Option<u32>,
    /// Per-volume deadline in seconds.
    pub resource_timeout_secs: Option<u64>,
}

/// `[ledger]` section.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileLedger {
    /// Ledger database path.
    pub path: Option<String>,
}

/// `[platform]` section.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFilePlatform {
    /// Platform-state JSON path.
    pub state: Option<String>,
    /// Describe page size.
    pub page_size: Option<usize>,
}

/// `[logging]` section.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileLogging {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// `EnvFilter` directive.
    pub filter: Option<String>,
    /// Log file path.
    pub file: Option<String>,
}

/// `[metrics]` section.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileMetrics {
    /// Whether metrics are enabled.
    pub enabled: Option<bool>,
    /// Push gateway settings.
    pub push_gateway: Option<ConfigFilePushGateway>,
}

/// `[metrics.push_gateway]` section.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFilePushGateway {
    /// Endpoint URI.
    pub endpoint: Option<String>,
    /// Basic auth username.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// Use POST instead of PUT.
    pub use_http_post: Option<bool>,
}

impl AutosnapConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;
        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks `$AUTOSNAP_CONFIG_PATH`, then the platform config dir
    /// (`~/.config/autosnap/config.toml` on Linux). Returns defaults if no
    /// file exists.
    pub fn load_default() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            if !path.trim().is_empty() {
                return Self::load_from_file(Path::new(&path));
            }
        }

        let Some(dirs) = directories::ProjectDirs::from("", "", "autosnap") else {
            return Ok(Self::default());
        };
        let path = dirs.config_dir().join("config.toml");
        if path.exists() {
            return Self::load_from_file(&path);
        }
        Ok(Self::default())
    }

    /// Converts a `ConfigFile` to `AutosnapConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(tags) = file.tags {
            if let Some(v) = tags.backup {
                config.tags.backup = v;
            }
            if let Some(v) = tags.retention {
                config.tags.retention = v;
            }
            if let Some(v) = tags.delete_after {
                config.tags.delete_after = v;
            }
        }
        if let Some(snapshot) = file.snapshot {
            if let Some(v) = snapshot.suffix {
                config.snapshot.suffix = v;
            }
            if let Some(v) = snapshot.description {
                config.snapshot.description = v;
            }
            if let Some(v) = snapshot.default_retention_days {
                config.snapshot.default_retention_days = v;
            }
            if let Some(v) = snapshot.resource_timeout_secs {
                config.snapshot.resource_timeout = Duration::from_secs(v);
            }
        }
        if let Some(path) = file.ledger.and_then(|ledger| ledger.path) {
            config.ledger_path = PathBuf::from(path);
        }
        if let Some(platform) = file.platform {
            config.platform_state = platform.state.map(PathBuf::from);
            if let Some(v) = platform.page_size {
                config.page_size = v;
            }
        }
        if let Some(logging) = file.logging {
            if let Some(format) = logging.format.as_deref().and_then(LogFormat::parse) {
                config.logging.format = format;
            }
            config.logging.filter = logging.filter;
            config.logging.file = logging.file.map(PathBuf::from);
        }
        if let Some(metrics) = file.metrics {
            config.metrics.enabled = metrics.enabled.unwrap_or(false);
            config.metrics.push_gateway = metrics.push_gateway.and_then(|pg| {
                let endpoint = pg.endpoint.filter(|e| !e.trim().is_empty())?;
                Some(PushGatewaySettings {
                    endpoint,
                    username: pg.username,
                    password: pg.password,
                    use_http_post: pg.use_http_post.unwrap_or(false),
                })
            });
        }

        config
    }

    /// Applies `AUTOSNAP_*` environment overrides from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies `AUTOSNAP_*` overrides using `lookup` to read variables.
    ///
    /// Unparsable numeric or boolean values are ignored.
    #[must_use]
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("AUTOSNAP_BACKUP_TAG") {
            self.tags.backup = v;
        }
        if let Some(v) = non_empty("AUTOSNAP_RETENTION_TAG") {
            self.tags.retention = v;
        }
        if let Some(v) = non_empty("AUTOSNAP_DELETE_AFTER_TAG") {
            self.tags.delete_after = v;
        }
        if let Some(v) = non_empty("AUTOSNAP_SNAPSHOT_SUFFIX") {
            self.snapshot.suffix = v;
        }
        if let Some(v) = non_empty("AUTOSNAP_SNAPSHOT_DESCRIPTION") {
            self.snapshot.description = v;
        }
        if let Some(v) = non_empty("AUTOSNAP_DEFAULT_RETENTION_DAYS").and_then(|v| v.parse().ok())
        {
            self.snapshot.default_retention_days = v;
        }
        if let Some(v) = non_empty("AUTOSNAP_RESOURCE_TIMEOUT_SECS").and_then(|v| v.parse().ok())
        {
            self.snapshot.resource_timeout = Duration::from_secs(v);
        }
        if let Some(v) = non_empty("AUTOSNAP_LEDGER_PATH") {
            self.ledger_path = PathBuf::from(v);
        }
        if let Some(v) = non_empty("AUTOSNAP_PLATFORM_STATE") {
            self.platform_state = Some(PathBuf::from(v));
        }
        if let Some(v) = non_empty("AUTOSNAP_PAGE_SIZE").and_then(|v| v.parse().ok()) {
            self.page_size = v;
        }
        if let Some(v) = non_empty("AUTOSNAP_DRY_RUN").and_then(|v| parse_bool(&v)) {
            self.dry_run = v;
        }
        if let Some(v) = non_empty("AUTOSNAP_LOG_FORMAT").and_then(|v| LogFormat::parse(&v)) {
            self.logging.format = v;
        }
        if let Some(v) = non_empty("AUTOSNAP_LOG") {
            self.logging.filter = Some(v);
        }
        if let Some(v) = non_empty("AUTOSNAP_LOG_FILE") {
            self.logging.file = Some(PathBuf::from(v));
        }
        if let Some(v) = non_empty("AUTOSNAP_METRICS_ENABLED").and_then(|v| parse_bool(&v)) {
            self.metrics.enabled = v;
        }
        if let Some(endpoint) = non_empty("AUTOSNAP_METRICS_PUSH_GATEWAY") {
            let current = self.metrics.push_gateway.take();
            self.metrics.push_gateway = Some(PushGatewaySettings {
                endpoint,
                username: non_empty("AUTOSNAP_METRICS_PUSH_USERNAME")
                    .or_else(|| current.as_ref().and_then(|pg| pg.username.clone())),
                password: non_empty("AUTOSNAP_METRICS_PUSH_PASSWORD")
                    .or_else(|| current.as_ref().and_then(|pg| pg.password.clone())),
                use_http_post: current.is_some_and(|pg| pg.use_http_post),
            });
        }

        self
    }

    /// Checks values the workflows cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("tags.backup", &self.tags.backup),
            ("tags.retention", &self.tags.retention),
            ("tags.delete_after", &self.tags.delete_after),
            ("snapshot.suffix", &self.snapshot.suffix),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(Error::InvalidInput(format!("{name} must not be empty")));
            }
        }
        if self.snapshot.default_retention_days == 0 {
            return Err(Error::InvalidInput(
                "snapshot.default_retention_days must be greater than zero".to_string(),
            ));
        }
        if self.snapshot.default_retention_days > MAX_DEFAULT_RETENTION_DAYS {
            return Err(Error::InvalidInput(format!(
                "snapshot.default_retention_days must be at most {MAX_DEFAULT_RETENTION_DAYS}"
            )));
        }
        if self.snapshot.resource_timeout.is_zero() {
            return Err(Error::InvalidInput(
                "snapshot.resource_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(Error::InvalidInput(
                "platform.page_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
