//! Stage metrics for the approach pipeline.
//!
//! Thin wrappers over the `metrics` facade so stage code records by
//! intent instead of by metric string. Without an installed recorder
//! (unit tests, library use) every call is a no-op.

use std::fmt;
use tracing::info;

/// Every metric name the pipeline emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Fetch
    FeedRecordsFetched,
    FeedRequestsError,

    // Clean
    CleanRecordsDropped,
    CleanRecordsFlagged,

    // Transform
    TransformRecordsEnriched,
    TransformDuplicateIdsDropped,

    // Validate
    ValidationRuns,
    ValidationViolations,

    // Load
    LoadOutcomes,
    LoadRowsInserted,
    LoadRowsConflicted,

    // Monitor
    MonitorThreatsDetected,

    // Notify
    NotificationsDelivered,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::FeedRecordsFetched => "neo_feed_records_fetched_total",
            MetricName::FeedRequestsError => "neo_feed_requests_error_total",
            MetricName::CleanRecordsDropped => "neo_clean_records_dropped_total",
            MetricName::CleanRecordsFlagged => "neo_clean_records_flagged_total",
            MetricName::TransformRecordsEnriched => "neo_transform_records_enriched_total",
            MetricName::TransformDuplicateIdsDropped => "neo_transform_duplicate_ids_dropped_total",
            MetricName::ValidationRuns => "neo_validation_runs_total",
            MetricName::ValidationViolations => "neo_validation_violations_total",
            MetricName::LoadOutcomes => "neo_load_outcomes_total",
            MetricName::LoadRowsInserted => "neo_load_rows_inserted_total",
            MetricName::LoadRowsConflicted => "neo_load_rows_conflicted_total",
            MetricName::MonitorThreatsDetected => "neo_monitor_threats_detected_total",
            MetricName::NotificationsDelivered => "neo_notifications_delivered_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Install the Prometheus recorder, with an HTTP listener when
/// `NEO_METRICS_PORT` is set.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    match std::env::var("NEO_METRICS_PORT").ok().and_then(|p| p.parse::<u16>().ok()) {
        Some(port) => {
            let addr: std::net::SocketAddr = ([0, 0, 0, 0], port).into();
            builder
                .with_http_listener(addr)
                .install()
                .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))?;
            info!("Prometheus exporter listening on http://{}/metrics", addr);
        }
        None => {
            builder
                .install_recorder()
                .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))?;
            info!("Metrics recorder installed");
        }
    }
    Ok(())
}

pub mod feed {
    use super::MetricName;

    pub fn records_fetched(count: usize) {
        ::metrics::counter!(MetricName::FeedRecordsFetched.as_str()).increment(count as u64);
    }

    pub fn request_failed() {
        ::metrics::counter!(MetricName::FeedRequestsError.as_str()).increment(1);
    }
}

pub mod clean {
    use super::MetricName;

    /// `reason` is one of `missing_nasa_id`, `missing_distance`, `duplicate`
    pub fn record_dropped(reason: &'static str) {
        ::metrics::counter!(MetricName::CleanRecordsDropped.as_str(), "reason" => reason).increment(1);
    }

    /// `flag` is `missing_data` or `outlier`
    pub fn record_flagged(flag: &'static str) {
        ::metrics::counter!(MetricName::CleanRecordsFlagged.as_str(), "flag" => flag).increment(1);
    }
}

pub mod transform {
    use super::MetricName;

    pub fn records_enriched(count: usize) {
        ::metrics::counter!(MetricName::TransformRecordsEnriched.as_str()).increment(count as u64);
    }

    pub fn duplicate_ids_dropped(count: usize) {
        ::metrics::counter!(MetricName::TransformDuplicateIdsDropped.as_str()).increment(count as u64);
    }
}

pub mod validation {
    use super::MetricName;

    pub fn run_completed(passed: bool, violations: usize) {
        let result = if passed { "passed" } else { "failed" };
        ::metrics::counter!(MetricName::ValidationRuns.as_str(), "result" => result).increment(1);
        ::metrics::counter!(MetricName::ValidationViolations.as_str()).increment(violations as u64);
    }
}

pub mod load {
    use super::MetricName;

    pub fn outcome(label: &'static str) {
        ::metrics::counter!(MetricName::LoadOutcomes.as_str(), "outcome" => label).increment(1);
    }

    pub fn rows_inserted(count: usize) {
        ::metrics::counter!(MetricName::LoadRowsInserted.as_str()).increment(count as u64);
    }

    pub fn rows_conflicted(count: usize) {
        ::metrics::counter!(MetricName::LoadRowsConflicted.as_str()).increment(count as u64);
    }
}

pub mod monitor {
    use super::MetricName;

    pub fn threat_detected(label: &str) {
        ::metrics::counter!(MetricName::MonitorThreatsDetected.as_str(), "alert" => label.to_string())
            .increment(1);
    }
}

pub mod notify {
    use super::MetricName;

    pub fn delivered(kind: &'static str, sink: &'static str) {
        ::metrics::counter!(MetricName::NotificationsDelivered.as_str(), "kind" => kind, "sink" => sink)
            .increment(1);
    }
}
