//! Prometheus metrics for index maintenance
//!
//! Counters are updated unconditionally; they only become visible once
//! [`init_metrics`] has registered them.

use prometheus::{
    core::{AtomicU64, GenericCounter},
    Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder,
};
use tracing::{error, info};

lazy_static::lazy_static! {
    /// Global metrics registry
    pub static ref METRICS_REGISTRY: Registry = Registry::new();

    pub static ref OPERATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("pageindex_operations_total", "Index operations by kind and outcome"),
        &["op", "status"]
    ).unwrap();

    pub static ref CASCADE_DEPTH: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "pageindex_cascade_depth",
            "Pages touched by a single insertion"
        ).buckets(vec![1.0, 2.0, 3.0, 5.0, 10.0, 50.0, 100.0])
    ).unwrap();

    pub static ref COMPACTION_MOVED_IDS: GenericCounter<AtomicU64> = GenericCounter::new(
        "pageindex_compaction_moved_ids_total",
        "Ids shifted to an earlier page by compaction"
    ).unwrap();

    pub static ref PAGES_DELETED: GenericCounter<AtomicU64> = GenericCounter::new(
        "pageindex_pages_deleted_total",
        "Page keys deleted by compaction"
    ).unwrap();
}

/// Register all metrics; repeated calls are harmless
pub fn init_metrics() {
    info!("Initializing Prometheus metrics");

    METRICS_REGISTRY.register(Box::new(OPERATIONS_TOTAL.clone())).ok();
    METRICS_REGISTRY.register(Box::new(CASCADE_DEPTH.clone())).ok();
    METRICS_REGISTRY.register(Box::new(COMPACTION_MOVED_IDS.clone())).ok();
    METRICS_REGISTRY.register(Box::new(PAGES_DELETED.clone())).ok();
}

/// Count one finished operation
pub fn record_operation<T, E>(op: &str, result: &std::result::Result<T, E>) {
    let status = if result.is_ok() { "success" } else { "error" };
    OPERATIONS_TOTAL.with_label_values(&[op, status]).inc();
}

/// Export all metrics in Prometheus text format
pub fn export_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|_| String::from("# Error converting metrics\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_contains_registered_metrics() {
        init_metrics();
        init_metrics();

        let ok: std::result::Result<(), ()> = Ok(());
        record_operation("add", &ok);
        CASCADE_DEPTH.observe(1.0);

        let text = export_metrics();
        assert!(text.contains("pageindex_operations_total"));
        assert!(text.contains("pageindex_cascade_depth"));
    }
}
