//! Prometheus metrics.
//!
//! Autosnap exits after each run, so nothing scrapes it. Metrics are
//! rendered once at shutdown and pushed to a Prometheus push gateway when one
//! is configured.

use crate::config::{MetricsSettings, PushGatewaySettings};
use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::thread;
use std::time::Duration;

/// Push gateway grouping key.
const JOB_NAME: &str = "autosnap";

/// Timeout for one push.
const PUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Metrics handle for flushing on shutdown.
#[derive(Debug)]
pub struct MetricsHandle {
    prometheus: PrometheusHandle,
    push_gateway: Option<PushGatewaySettings>,
}

impl MetricsHandle {
    /// Renders the current metrics in the Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.prometheus.render()
    }
}

/// Installs the Prometheus recorder as the global `metrics` recorder.
///
/// Returns `None` when metrics are disabled; `metrics` macros are then
/// no-ops.
///
/// # Errors
///
/// Returns an error if a global recorder is already installed.
pub fn install_prometheus(settings: &MetricsSettings) -> Result<Option<MetricsHandle>> {
    if !settings.enabled {
        return Ok(None);
    }

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::OperationFailed {
            operation: "metrics_recorder_install".to_string(),
            cause: e.to_string(),
        })?;

    Ok(Some(MetricsHandle {
        prometheus,
        push_gateway: settings.push_gateway.clone(),
    }))
}

/// Pushes metrics to the push gateway if configured.
///
/// When called from within a tokio runtime, the push runs on a separate
/// thread so `reqwest::blocking` does not nest runtimes.
pub fn flush(handle: &MetricsHandle) {
    let Some(push_gateway) = handle.push_gateway.clone() else {
        tracing::debug!("No push gateway configured, skipping flush");
        return;
    };

    let mut payload = handle.render();
    if !payload.ends_with('\n') {
        payload.push('\n');
    }
    let endpoint = job_endpoint(&push_gateway.endpoint);

    tracing::debug!(
        bytes = payload.len(),
        endpoint = %endpoint,
        "Pushing metrics to push gateway"
    );

    if tokio::runtime::Handle::try_current().is_ok() {
        let pusher = thread::spawn(move || push(&endpoint, payload, &push_gateway));
        let _ = pusher.join();
    } else {
        push(&endpoint, payload, &push_gateway);
    }
}

/// Appends the job grouping path unless the endpoint already has one.
fn job_endpoint(endpoint: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    if base.contains("/metrics/job/") {
        base.to_string()
    } else {
        format!("{base}/metrics/job/{JOB_NAME}")
    }
}

fn push(endpoint: &str, payload: String, settings: &PushGatewaySettings) {
    let client = Client::new();

    let request = if settings.use_http_post {
        client.post(endpoint)
    } else {
        client.put(endpoint)
    };

    let request = if let Some(username) = &settings.username {
        request.basic_auth(username, settings.password.as_deref())
    } else {
        request
    };

    let response = request
        .header(CONTENT_TYPE, "text/plain; version=0.0.4")
        .timeout(PUSH_TIMEOUT)
        .body(payload)
        .send();

    match response {
        Ok(resp) if resp.status().is_success() => {
            tracing::debug!(status = %resp.status(), "Metrics pushed successfully");
        },
        Ok(resp) => {
            tracing::warn!(status = %resp.status(), "Metrics push failed");
        },
        Err(err) => {
            tracing::warn!("Failed to push metrics: {err}");
        },
    }
}
