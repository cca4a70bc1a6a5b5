/// Metrics Module - Prometheus Instrumentation
///
/// A scaled-down version of the teacher's metrics catalog, covering the
/// indexing pipeline's throughput, RPC latency, and reconcile outcomes.

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec, Opts, Registry, TextEncoder,
};
use lazy_static::lazy_static;

/// Standard latency buckets (seconds).
const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

lazy_static! {
    /// Global Prometheus registry.
    pub static ref REGISTRY: Registry = Registry::new();

    /// Per-block pipeline invocations, labeled by outcome (skip, mark_stable, replace).
    pub static ref PIPELINE_INVOCATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("chainidx_pipeline_invocations_total", "Per-block pipeline invocations by reconcile decision"),
        &["decision"]
    ).unwrap();

    /// Transactions persisted.
    pub static ref TRANSACTIONS_PERSISTED: IntCounter = IntCounter::new(
        "chainidx_transactions_persisted_total",
        "Total transactions upserted into the store"
    ).unwrap();

    /// Receipts fetched, labeled by outcome (ok, error).
    pub static ref RECEIPT_FETCHES: IntCounterVec = IntCounterVec::new(
        Opts::new("chainidx_receipt_fetches_total", "Receipt fetches by outcome"),
        &["outcome"]
    ).unwrap();

    /// Reorgs handled (old block deleted and replaced).
    pub static ref REORGS_HANDLED: IntCounter = IntCounter::new(
        "chainidx_reorgs_handled_total",
        "Total reorgs reconciled (delete-then-replace at a height)"
    ).unwrap();

    /// Current indexed height, labeled by source (tailer, backfill) and stability.
    pub static ref INDEXED_HEIGHT: IntGaugeVec = IntGaugeVec::new(
        Opts::new("chainidx_indexed_height", "Highest height the tailer has submitted"),
        &["stability"]
    ).unwrap();

    /// Chain tip height observed from the RPC source.
    pub static ref CHAIN_TIP_HEIGHT: IntGauge = IntGauge::new(
        "chainidx_chain_tip_height",
        "Chain tip height last observed from the RPC source"
    ).unwrap();

    /// RPC call latency, labeled by method.
    pub static ref RPC_CALL_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("chainidx_rpc_call_duration_seconds", "RPC call latency by method")
            .buckets(LATENCY_BUCKETS.to_vec()),
        &["method"]
    ).unwrap();

    /// Storage call latency, labeled by operation.
    pub static ref STORAGE_CALL_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("chainidx_storage_call_duration_seconds", "Storage gateway call latency by operation")
            .buckets(LATENCY_BUCKETS.to_vec()),
        &["operation"]
    ).unwrap();

    /// Errors observed, labeled by kind (transient_upstream, permanent_upstream, storage, reconcile_refusal).
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("chainidx_errors_total", "Errors observed, by kind"),
        &["kind"]
    ).unwrap();
}

/// Registers every metric with the global registry. Call once at startup.
pub fn register_all() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(PIPELINE_INVOCATIONS.clone()))?;
    REGISTRY.register(Box::new(TRANSACTIONS_PERSISTED.clone()))?;
    REGISTRY.register(Box::new(RECEIPT_FETCHES.clone()))?;
    REGISTRY.register(Box::new(REORGS_HANDLED.clone()))?;
    REGISTRY.register(Box::new(INDEXED_HEIGHT.clone()))?;
    REGISTRY.register(Box::new(CHAIN_TIP_HEIGHT.clone()))?;
    REGISTRY.register(Box::new(RPC_CALL_DURATION.clone()))?;
    REGISTRY.register(Box::new(STORAGE_CALL_DURATION.clone()))?;
    REGISTRY.register(Box::new(ERRORS_TOTAL.clone()))?;
    Ok(())
}

/// Renders the registry in Prometheus text-exposition format.
pub fn render() -> String {
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    encoder.encode(&metric_families, &mut buffer).ok();
    String::from_utf8(buffer).unwrap_or_default()
}

/// Times a fallible async operation and observes it on a latency histogram.
pub async fn timed<F, T, E>(histogram: &Histogram, fut: F) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
{
    let start = std::time::Instant::now();
    let result = fut.await;
    histogram.observe(start.elapsed().as_secs_f64());
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_all_is_idempotent_safe_once() {
        // A fresh registry instance per test process would double-register;
        // this just checks the call succeeds once per test binary.
        let _ = register_all();
        assert!(render().contains("chainidx_") || render().is_empty());
    }
}
