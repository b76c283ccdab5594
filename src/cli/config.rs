//! `config` command.

#![allow(clippy::print_stdout)]

use crate::config::{AutosnapConfig, LogFormat};
use crate::{Error, Result};
use serde::Serialize;

/// `config` command handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigCommand {
    show: bool,
}

impl ConfigCommand {
    /// Creates a config command; `show` prints the effective configuration.
    #[must_use]
    pub const fn new(show: bool) -> Self {
        Self { show }
    }

    /// Runs the command.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be rendered.
    pub fn execute(self, config: &AutosnapConfig) -> Result<()> {
        if self.show {
            print!("{}", render_config(config)?);
        } else {
            println!("Use --show to print the effective configuration");
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct ConfigView<'a> {
    dry_run: bool,
    tags: TagsView<'a>,
    snapshot: SnapshotView<'a>,
    ledger: LedgerView,
    platform: PlatformView,
    logging: LoggingView<'a>,
    metrics: MetricsView<'a>,
}

#[derive(Serialize)]
struct TagsView<'a> {
    backup: &'a str,
    retention: &'a str,
    delete_after: &'a str,
}

#[derive(Serialize)]
struct SnapshotView<'a> {
    suffix: &'a str,
    description: &'a str,
    default_retention_days: u32,
    resource_timeout_secs: u64,
}

#[derive(Serialize)]
struct LedgerView {
    path: String,
}

#[derive(Serialize)]
struct PlatformView {
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<String>,
    page_size: usize,
}

#[derive(Serialize)]
struct LoggingView<'a> {
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<String>,
}

#[derive(Serialize)]
struct MetricsView<'a> {
    enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    push_gateway: Option<PushGatewayView<'a>>,
}

#[derive(Serialize)]
struct PushGatewayView<'a> {
    endpoint: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'static str>,
    use_http_post: bool,
}

/// Renders the effective configuration as TOML with secrets masked.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn render_config(config: &AutosnapConfig) -> Result<String> {
    let view = ConfigView {
        dry_run: config.dry_run,
        tags: TagsView {
            backup: &config.tags.backup,
            retention: &config.tags.retention,
            delete_after: &config.tags.delete_after,
        },
        snapshot: SnapshotView {
            suffix: &config.snapshot.suffix,
            description: &config.snapshot.description,
            default_retention_days: config.snapshot.default_retention_days,
            resource_timeout_secs: config.snapshot.resource_timeout.as_secs(),
        },
        ledger: LedgerView {
            path: config.ledger_path.display().to_string(),
        },
        platform: PlatformView {
            state: config
                .platform_state
                .as_ref()
                .map(|p| p.display().to_string()),
            page_size: config.page_size,
        },
        logging: LoggingView {
            format: match config.logging.format {
                LogFormat::Pretty => "pretty",
                LogFormat::Json => "json",
            },
            filter: config.logging.filter.as_deref(),
            file: config.logging.file.as_ref().map(|p| p.display().to_string()),
        },
        metrics: MetricsView {
            enabled: config.metrics.enabled,
            push_gateway: config
                .metrics
                .push_gateway
                .as_ref()
                .map(|pg| PushGatewayView {
                    endpoint: &pg.endpoint,
                    username: pg.username.as_deref(),
                    password: pg.password.as_ref().map(|_| "********"),
                    use_http_post: pg.use_http_post,
                }),
        },
    };

    toml::to_string_pretty(&view).map_err(|e| Error::failed("render_config", e))
}
