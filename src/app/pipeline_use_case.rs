use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, info_span, warn};

use crate::app::ports::{FeedSourcePort, NotificationSink};
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::notification::Notification;
use crate::observability::metrics;
use crate::pipeline::ingestion::feed::{parse_feed, FeedWindow};
use crate::pipeline::load::{LoadTarget, Loader};
use crate::pipeline::processing::clean::Cleaner;
use crate::pipeline::processing::monitor::Monitor;
use crate::pipeline::processing::transform::Transformer;
use crate::pipeline::processing::validate::Validator;
use crate::pipeline::storage::ApproachStore;
use crate::types::{LoadOutcome, ThreatEvent};

/// How one pipeline run ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// Validation failed; nothing was loaded
    Halted {
        violations: Vec<String>,
        threats: Vec<ThreatEvent>,
    },
    Completed {
        load: LoadOutcome,
        threats: Vec<ThreatEvent>,
    },
}

impl PipelineOutcome {
    pub fn threats(&self) -> &[ThreatEvent] {
        match self {
            PipelineOutcome::Halted { threats, .. } | PipelineOutcome::Completed { threats, .. } => threats,
        }
    }

    /// Messages owed to the recipients for this run, status first.
    pub fn notifications(&self, recipients: &[String]) -> Vec<Notification> {
        let status = match self {
            PipelineOutcome::Halted { violations, .. } => Notification::pipeline_halted(recipients, violations),
            PipelineOutcome::Completed { load, .. } => Notification::load_status(recipients, load),
        };
        std::iter::once(status)
            .chain(Notification::threat_alert(recipients, self.threats()))
            .collect()
    }
}

/// Runs Clean → Transform → Validate → {Load, Monitor} over one feed payload.
pub struct PipelineUseCase<S: ApproachStore> {
    cleaner: Cleaner,
    transformer: Transformer,
    validator: Validator,
    monitor: Monitor,
    loader: Loader<S>,
    monitor_on_validation_failure: bool,
}

impl<S: ApproachStore> PipelineUseCase<S> {
    pub fn new(config: &Config, store: S) -> Result<Self> {
        Ok(Self {
            cleaner: Cleaner::new(config.cleaning.clone())?,
            transformer: Transformer::new(config.transform.clone()),
            validator: Validator::new(),
            monitor: Monitor::new(config.monitor.clone()),
            loader: Loader::new(store, LoadTarget::from(&config.storage)),
            monitor_on_validation_failure: config.monitor.run_on_validation_failure,
        })
    }

    pub fn loader(&self) -> &Loader<S> {
        &self.loader
    }

    /// Fetch the window from `source` and run the pipeline over it.
    pub async fn run(&self, source: &dyn FeedSourcePort, window: &FeedWindow, now: DateTime<Utc>) -> Result<PipelineOutcome> {
        info!(start = %window.start_date, end = %window.end_date, "fetching feed window");
        let payload = match source.fetch(window).await {
            Ok(payload) => payload,
            Err(e) => {
                metrics::feed::request_failed();
                error!(error = %e, "feed fetch failed");
                return Err(e);
            }
        };
        self.run_payload(&payload, now)
    }

    /// Run the stages over an already fetched payload with the clock `now`.
    pub fn run_payload(&self, payload: &Value, now: DateTime<Utc>) -> Result<PipelineOutcome> {
        let span = info_span!("pipeline_run", batch_at = %now);
        let _enter = span.enter();

        let raw = parse_feed(payload)?;
        if raw.is_empty() {
            return Err(PipelineError::EmptyBatch);
        }
        let cleaned = self.cleaner.clean(&raw);
        if cleaned.is_empty() {
            // Every entry was unusable: nothing to load, but the run still reports
            warn!(entries = raw.len(), "every feed entry was dropped during cleaning");
            metrics::load::outcome(LoadOutcome::Skipped.label());
            return Ok(PipelineOutcome::Completed {
                load: LoadOutcome::Skipped,
                threats: Vec::new(),
            });
        }
        let enriched = self.transformer.transform(cleaned, now);
        let validation = self.validator.validate(&enriched, now)?;

        if !validation.passed {
            warn!(violations = validation.violations.len(), "validation failed, pipeline halted");
            let threats = if self.monitor_on_validation_failure {
                self.monitor.scan(&enriched)
            } else {
                Vec::new()
            };
            return Ok(PipelineOutcome::Halted {
                violations: validation.violations,
                threats,
            });
        }

        let load = self.loader.load(&enriched, now)?;
        let threats = self.monitor.scan(&enriched);
        info!(load = load.label(), threats = threats.len(), "pipeline run completed");
        Ok(PipelineOutcome::Completed { load, threats })
    }
}

/// Hand every notification to every sink. A failing sink is logged and
/// does not stop the others.
pub async fn dispatch(notifications: &[Notification], sinks: &[Box<dyn NotificationSink>]) -> usize {
    let mut delivered = 0;
    for notification in notifications {
        for sink in sinks {
            match sink.deliver(notification).await {
                Ok(()) => {
                    metrics::notify::delivered(notification.payload.kind(), sink.name());
                    delivered += 1;
                }
                Err(e) => {
                    error!(sink = sink.name(), subject = %notification.subject, error = %e, "notification delivery failed");
                }
            }
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::storage::InMemoryStore;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Mutex;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn entry(id: &str, name: &str, distance: &str, hazardous: bool) -> Value {
        json!({
            "id": id,
            "name": name,
            "nasa_jpl_url": format!("https://ssd.jpl.nasa.gov/tools/sbdb_lookup.html#/?sstr={}", id),
            "is_potentially_hazardous_asteroid": hazardous,
            "estimated_diameter": { "meters": { "estimated_diameter_min": 50.0, "estimated_diameter_max": 120.0 } },
            "close_approach_data": [{
                "close_approach_date_full": "2024-Jan-01 07:13",
                "relative_velocity": { "kilometers_per_hour": "45000.5" },
                "miss_distance": { "kilometers": distance }
            }]
        })
    }

    fn payload(entries: Vec<Value>) -> Value {
        json!({ "near_earth_objects": { "2024-01-01": entries } })
    }

    #[test]
    fn test_completed_run_loads_and_notifies() {
        let use_case = PipelineUseCase::new(&Config::default(), InMemoryStore::new()).unwrap();
        let outcome = use_case
            .run_payload(
                &payload(vec![
                    entry("1", "(2020 AB)", "5000000", false),
                    entry("2", "(2021 CD)", "6000000", false),
                ]),
                now(),
            )
            .unwrap();

        assert!(matches!(
            outcome,
            PipelineOutcome::Completed { load: LoadOutcome::Loaded { record_count: 2, .. }, .. }
        ));
        let notes = outcome.notifications(&["ops@example.org".to_string()]);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].payload.kind(), "load_status");
    }

    #[test]
    fn test_empty_feed_is_an_error() {
        let use_case = PipelineUseCase::new(&Config::default(), InMemoryStore::new()).unwrap();
        assert!(matches!(
            use_case.run_payload(&json!({ "near_earth_objects": {} }), now()),
            Err(PipelineError::EmptyBatch)
        ));
        assert!(matches!(
            use_case.run_payload(&json!({ "links": {} }), now()),
            Err(PipelineError::MalformedFeed(_))
        ));
    }

    #[test]
    fn test_feed_with_only_unusable_entries_reports_a_skip() {
        let use_case = PipelineUseCase::new(&Config::default(), InMemoryStore::new()).unwrap();
        let mut no_distance = entry("1", "(2020 AB)", "5000000", true);
        no_distance["close_approach_data"][0]
            .as_object_mut()
            .unwrap()
            .remove("miss_distance");

        let outcome = use_case.run_payload(&payload(vec![no_distance]), now()).unwrap();

        assert_eq!(
            outcome,
            PipelineOutcome::Completed { load: LoadOutcome::Skipped, threats: Vec::new() }
        );
        let notes = outcome.notifications(&["ops@example.org".to_string()]);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].subject, crate::constants::SUBJECT_LOAD_SKIPPED);
        assert!(use_case.loader().store().rows("neo", "near_earth_objects").is_empty());
    }

    #[test]
    fn test_halted_run_can_skip_monitor() {
        let mut config = Config::default();
        config.monitor.run_on_validation_failure = false;
        let use_case = PipelineUseCase::new(&config, InMemoryStore::new()).unwrap();

        // No velocity: no velocity category and no hazard score
        let mut flagged = entry("1", "(2020 AB)", "5000000", true);
        flagged["close_approach_data"][0]
            .as_object_mut()
            .unwrap()
            .remove("relative_velocity");
        let outcome = use_case.run_payload(&payload(vec![flagged]), now()).unwrap();
        match outcome {
            PipelineOutcome::Halted { violations, threats } => {
                assert!(!violations.is_empty());
                assert!(threats.is_empty());
            }
            other => panic!("expected halt, got {:?}", other),
        }
    }

    struct RecordingSink {
        subjects: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn deliver(&self, notification: &Notification) -> anyhow::Result<()> {
            self.subjects.lock().unwrap().push(notification.subject.clone());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl NotificationSink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn deliver(&self, _: &Notification) -> anyhow::Result<()> {
            anyhow::bail!("smtp unreachable")
        }
    }

    #[tokio::test]
    async fn test_dispatch_survives_failing_sink() {
        let notes = vec![Notification::load_status(&[], &LoadOutcome::Skipped)];
        let sinks: Vec<Box<dyn NotificationSink>> = vec![
            Box::new(FailingSink),
            Box::new(RecordingSink { subjects: Mutex::new(Vec::new()) }),
        ];
        assert_eq!(dispatch(&notes, &sinks).await, 1);
    }
}
