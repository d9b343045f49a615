//! Prometheus counters and histograms for CAS round trips, PGT
//! correlation, proxy tickets, single sign-out and retention purges.
//!
//! Every `record_*` function compiles to a no-op without the `prometheus`
//! feature, so call sites never need their own `cfg`.

#[cfg(feature = "prometheus")]
use std::sync::OnceLock;

#[cfg(feature = "prometheus")]
use metrics::{counter, histogram};
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::MetricsConfig;

#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global recorder. Bucket bounds are configured in
/// milliseconds and recorded in seconds.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    let buckets: Vec<f64> = config
        .latency_buckets_ms
        .iter()
        .map(|ms| ms / 1000.0)
        .collect();

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
            &buckets,
        )
        .map_err(|e| MetricsError::Setup(e.to_string()))?
        .install_recorder()
        .map_err(MetricsError::Install)?;

    PROMETHEUS_HANDLE
        .set(handle)
        .map_err(|_| MetricsError::Setup("metrics recorder already installed".to_string()))?;

    Ok(())
}

#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(_config: &MetricsConfig) -> Result<(), MetricsError> {
    Ok(())
}

#[cfg(feature = "prometheus")]
pub fn get_prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Record a `/proxyValidate` round trip.
///
/// `kind` is "service" or "proxy"; `outcome` one of "success", "failure",
/// "malformed", "network" or "cancelled". The duration includes any PGT
/// correlation wait.
pub fn record_cas_validation(kind: &str, outcome: &str, duration_secs: f64) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "cas_validations_total",
            "kind" => kind.to_string(),
            "outcome" => outcome.to_string()
        )
        .increment(1);

        histogram!("cas_validation_duration_seconds", "kind" => kind.to_string())
            .record(duration_secs);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (kind, outcome, duration_secs);
    }
}

/// Record the result of matching a PGT IOU with its callback.
///
/// `attempts` is the number of store lookups made, including the first.
pub fn record_pgt_correlation(outcome: &str, attempts: u32) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "cas_pgt_correlations_total",
            "outcome" => outcome.to_string()
        )
        .increment(1);

        histogram!("cas_pgt_correlation_attempts").record(f64::from(attempts));
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (outcome, attempts);
    }
}

/// Record a proxy ticket request.
pub fn record_proxy_ticket(outcome: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "cas_proxy_tickets_total",
            "outcome" => outcome.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = outcome;
    }
}

/// Record a single sign-out notification: "logged_out", "forbidden",
/// "unresolved" (no ticket or no mapping) or "stale" (mapping found, session
/// already gone).
pub fn record_single_sign_out(outcome: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "cas_single_sign_out_total",
            "outcome" => outcome.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = outcome;
    }
}

/// Record rows removed by a retention purge.
pub fn record_retention_deletion(table: &str, count: u64) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "retention_deletions_total",
            "table" => table.to_string()
        )
        .increment(count);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (table, count);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("metrics setup failed: {0}")]
    Setup(String),

    #[cfg(feature = "prometheus")]
    #[error("could not install the Prometheus recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}
