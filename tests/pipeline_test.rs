use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};
use tempfile::tempdir;

use neo_watch::app::pipeline_use_case::{PipelineOutcome, PipelineUseCase};
use neo_watch::config::Config;
use neo_watch::constants::{ALERT_FLAGGED_HAZARD, SUBJECT_PIPELINE_HALTED, SUBJECT_THREAT_ALERT};
use neo_watch::notification::NotificationPayload;
use neo_watch::pipeline::storage::{InMemoryStore, SqliteStore};
use neo_watch::types::{LoadOutcome, ProcessingStatus};

fn run_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 14, 6, 30, 0).unwrap()
}

fn neo(id: &str, distance_km: Option<&str>, hazardous: bool) -> Value {
    let mut approach = json!({
        "close_approach_date": "2024-03-14",
        "close_approach_date_full": "2024-Mar-14 09:41",
        "relative_velocity": { "kilometers_per_second": "12.5", "kilometers_per_hour": "45000.12" },
        "orbiting_body": "Earth"
    });
    if let Some(km) = distance_km {
        approach["miss_distance"] = json!({ "astronomical": "0.03", "kilometers": km });
    }
    json!({
        "id": id,
        "neo_reference_id": id,
        "name": format!("({} XY1)", id),
        "nasa_jpl_url": format!("https://ssd.jpl.nasa.gov/tools/sbdb_lookup.html#/?sstr={}", id),
        "estimated_diameter": {
            "meters": { "estimated_diameter_min": 61.2, "estimated_diameter_max": 136.9 }
        },
        "is_potentially_hazardous_asteroid": hazardous,
        "close_approach_data": [approach]
    })
}

fn feed(entries: Vec<Value>) -> Value {
    json!({
        "links": { "self": "http://api.nasa.gov/neo/rest/v1/feed" },
        "element_count": entries.len(),
        "near_earth_objects": { "2024-03-14": entries }
    })
}

#[test]
fn test_record_without_distance_is_dropped_and_the_rest_loads() -> Result<()> {
    let use_case = PipelineUseCase::new(&Config::default(), InMemoryStore::new())?;
    let payload = feed(vec![neo("2001", None, false), neo("2002", Some("4512345.67"), false)]);

    let outcome = use_case.run_payload(&payload, run_at())?;

    match &outcome {
        PipelineOutcome::Completed { load: LoadOutcome::Loaded { record_count, batch_id, .. }, threats } => {
            assert_eq!(*record_count, 1);
            assert_eq!(batch_id, "20240314063000000");
            assert!(threats.is_empty());
        }
        other => panic!("expected a completed load, got {:?}", other),
    }

    let rows = use_case.loader().store().rows("neo", "near_earth_objects");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].nasa_id, "2002");
    assert_eq!(rows[0].asteroid_name.as_deref(), Some("2002 XY1"));
    assert_eq!(rows[0].hazard_score, Some(0.0));
    assert_eq!(rows[0].processing_status, ProcessingStatus::Loaded);
    Ok(())
}

#[test]
fn test_replaying_a_feed_into_sqlite_is_idempotent() -> Result<()> {
    let dir = tempdir()?;
    let mut config = Config::default();
    config.storage.database_path = dir.path().join("neo_watch.db");
    let payload = feed(vec![neo("3001", Some("2500000"), false), neo("3002", Some("9000000"), false)]);

    let first = {
        let store = SqliteStore::open(&config.storage.database_path)?;
        let use_case = PipelineUseCase::new(&config, store)?;
        use_case.run_payload(&payload, run_at())?
    };
    assert!(matches!(
        first,
        PipelineOutcome::Completed { load: LoadOutcome::Loaded { record_count: 2, .. }, .. }
    ));

    // Same batch again, then a later batch with the same ids
    let store = SqliteStore::open(&config.storage.database_path)?;
    let use_case = PipelineUseCase::new(&config, store)?;
    for now in [run_at(), run_at() + Duration::hours(1)] {
        let outcome = use_case.run_payload(&payload, now)?;
        assert!(matches!(outcome, PipelineOutcome::Completed { load: LoadOutcome::Skipped, .. }));
    }

    let store = use_case.loader().store();
    assert_eq!(store.row_count("neo", "near_earth_objects")?, 2);
    let audit = store.audit_rows("neo", "load_audit")?;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].batch_id, "20240314063000000");
    assert_eq!(audit[0].record_count, 2);
    Ok(())
}

#[test]
fn test_negative_diameter_halts_and_still_reports_threats() -> Result<()> {
    let use_case = PipelineUseCase::new(&Config::default(), InMemoryStore::new())?;
    let mut bad = neo("4001", Some("3200000"), true);
    bad["estimated_diameter"]["meters"]["estimated_diameter_min"] = json!(-3.5);

    let outcome = use_case.run_payload(&feed(vec![bad, neo("4002", Some("8000000"), false)]), run_at())?;

    let PipelineOutcome::Halted { violations, threats } = &outcome else {
        panic!("expected a halted run, got {:?}", outcome);
    };
    assert!(violations.iter().any(|v| v.contains("diameters")));
    assert_eq!(threats.len(), 1);
    assert_eq!(threats[0].nasa_id, "4001");
    assert_eq!(threats[0].alerts, vec![ALERT_FLAGGED_HAZARD]);
    assert_eq!(threats[0].closest_approach_time, "2024-03-14T15:11:00+05:30");
    assert!(use_case.loader().store().rows("neo", "near_earth_objects").is_empty());

    let notifications = outcome.notifications(&["planetary-defense@example.org".to_string()]);
    let subjects: Vec<&str> = notifications.iter().map(|n| n.subject.as_str()).collect();
    assert_eq!(subjects, vec![SUBJECT_PIPELINE_HALTED, SUBJECT_THREAT_ALERT]);
    assert!(matches!(notifications[0].payload, NotificationPayload::PipelineHalted { .. }));
    Ok(())
}

#[test]
fn test_untrusted_reference_url_is_replaced() -> Result<()> {
    let use_case = PipelineUseCase::new(&Config::default(), InMemoryStore::new())?;
    let mut entry = neo("5001", Some("5000000"), false);
    entry["nasa_jpl_url"] = json!("http://example.com/5001");

    use_case.run_payload(&feed(vec![entry]), run_at())?;

    let rows = use_case.loader().store().rows("neo", "near_earth_objects");
    assert_eq!(rows[0].nasa_site_url, "url not found");
    Ok(())
}
