//! Structured logging configuration.

use crate::config::{LogFormat, LoggingSettings};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Filter used when nothing else is configured.
const DEFAULT_FILTER: &str = "info";

/// Filter used with `--verbose`.
const VERBOSE_FILTER: &str = "debug";

/// Resolved logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Event filter.
    pub filter: EnvFilter,
    /// Append output to this file instead of stderr.
    pub file: Option<PathBuf>,
    /// A directive that failed to parse and was replaced by the default.
    pub rejected_filter: Option<String>,
}

impl LoggingConfig {
    /// Builds logging configuration from settings, honouring `RUST_LOG`.
    #[must_use]
    pub fn from_settings(settings: &LoggingSettings, verbose: bool) -> Self {
        let directive = filter_directive(
            settings.filter.as_deref(),
            std::env::var("RUST_LOG").ok().as_deref(),
            verbose,
        );
        let (filter, rejected_filter) = match EnvFilter::try_new(&directive) {
            Ok(filter) => (filter, None),
            Err(_) => (EnvFilter::new(DEFAULT_FILTER), Some(directive)),
        };

        Self {
            format: settings.format,
            filter,
            file: settings.file.clone(),
            rejected_filter,
        }
    }
}

/// Picks the filter directive.
///
/// Precedence: configured filter (`AUTOSNAP_LOG` or `[logging] filter`),
/// then `RUST_LOG`, then `debug` when verbose, else `info`.
fn filter_directive(configured: Option<&str>, rust_log: Option<&str>, verbose: bool) -> String {
    configured
        .or(rust_log)
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map_or_else(
            || {
                if verbose {
                    VERBOSE_FILTER.to_string()
                } else {
                    DEFAULT_FILTER.to_string()
                }
            },
            ToString::to_string,
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Some("autosnap=trace"), Some("warn"), false, "autosnap=trace"; "configured wins")]
    #[test_case(None, Some("warn"), true, "warn"; "rust log beats verbose")]
    #[test_case(None, None, true, "debug"; "verbose")]
    #[test_case(None, None, false, "info"; "default")]
    #[test_case(Some("  "), None, false, "info"; "blank configured ignored")]
    fn test_filter_directive(
        configured: Option<&str>,
        rust_log: Option<&str>,
        verbose: bool,
        expected: &str,
    ) {
        assert_eq!(filter_directive(configured, rust_log, verbose), expected);
    }

    #[test]
    fn test_from_settings_keeps_format_and_file() {
        let settings = LoggingSettings {
            format: LogFormat::Json,
            filter: Some("autosnap=debug".to_string()),
            file: Some(PathBuf::from("/tmp/autosnap.log")),
        };
        let config = LoggingConfig::from_settings(&settings, false);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.file, Some(PathBuf::from("/tmp/autosnap.log")));
        assert!(config.rejected_filter.is_none());
    }

    #[test]
    fn test_invalid_filter_falls_back() {
        let settings = LoggingSettings {
            filter: Some("autosnap=notalevel".to_string()),
            ..Default::default()
        };
        let config = LoggingConfig::from_settings(&settings, false);
        assert_eq!(config.rejected_filter.as_deref(), Some("autosnap=notalevel"));
    }
}
