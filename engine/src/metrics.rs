//! Prometheus metrics for engine observability.

use metrics::{counter, histogram};

/// Initialize metrics exporter (Prometheus).
pub fn init_metrics() {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    if let Err(e) = builder.install() {
        tracing::warn!("Failed to install Prometheus exporter: {}", e);
    }
}

/// Record a build created during sync.
pub fn build_synced(status: &str) {
    counter!("flakehawk_builds_synced_total", "status" => status.to_string()).increment(1);
}

/// Record a release upserted during sync.
pub fn release_synced() {
    counter!("flakehawk_releases_synced_total").increment(1);
}

/// Record extracted test outcomes by evidence source.
pub fn outcomes_extracted(source: &'static str, count: usize) {
    counter!("flakehawk_outcomes_extracted_total", "source" => source).increment(count as u64);
}

/// Record a skipped unit of work (run, job, or release).
pub fn unit_skipped(unit: &'static str) {
    counter!("flakehawk_units_skipped_total", "unit" => unit).increment(1);
}

/// Record sync duration.
pub fn sync_duration(duration_ms: u64) {
    histogram!("flakehawk_sync_duration_ms").record(duration_ms as f64);
}

/// Record a flakiness analysis pass.
pub fn analysis_completed(flagged: usize) {
    counter!("flakehawk_analyses_total").increment(1);
    histogram!("flakehawk_flagged_tests").record(flagged as f64);
}
