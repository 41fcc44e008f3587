//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at startup before any metrics are recorded.
///
/// # Errors
///
/// Fails when a global recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, metrics_exporter_prometheus::BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
#[must_use]
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across crates.

/// Connections accepted total (counter).
pub const HUB_CONNECTIONS_TOTAL: &str = "hub_connections_total";
/// Disconnections total (counter).
pub const HUB_DISCONNECTIONS_TOTAL: &str = "hub_disconnections_total";
/// Registered connections (gauge).
pub const HUB_CONNECTIONS_ACTIVE: &str = "hub_connections_active";
/// Live rooms (gauge).
pub const HUB_ROOMS_ACTIVE: &str = "hub_rooms_active";
/// Inbound messages total (counter, labels: kind).
pub const HUB_MESSAGES_TOTAL: &str = "hub_messages_total";
/// Unparseable inbound frames total (counter).
pub const HUB_MALFORMED_TOTAL: &str = "hub_malformed_total";
/// Upgrade requests rejected for missing identity (counter).
pub const HUB_REJECTED_UPGRADES_TOTAL: &str = "hub_rejected_upgrades_total";
