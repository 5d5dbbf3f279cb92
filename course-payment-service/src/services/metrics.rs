use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

use crate::models::ReconciliationChannel;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the process-wide Prometheus recorder. Call once from `main`.
pub fn init_metrics() -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {}", e))?;

    METRICS_HANDLE
        .set(handle)
        .map_err(|_| anyhow::anyhow!("metrics recorder already initialized"))?;

    Ok(())
}

pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

/// `outcome`: `redirected`, `gateway_error`.
pub fn record_checkout(outcome: &'static str) {
    counter!("payment_checkouts_total", "outcome" => outcome).increment(1);
}

pub fn record_reconciliation(channel: ReconciliationChannel, outcome: &'static str) {
    counter!(
        "payment_reconciliations_total",
        "channel" => channel.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

/// `outcome`: `received`, `ignored`, `forbidden`, `not_found`.
pub fn record_webhook(outcome: &'static str) {
    counter!("payment_webhooks_total", "outcome" => outcome).increment(1);
}

pub fn record_expired(count: u64) {
    counter!("payment_sweeps_expired_total").increment(count);
}
