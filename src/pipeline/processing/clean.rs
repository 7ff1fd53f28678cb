use chrono::{FixedOffset, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::config::CleaningConfig;
use crate::error::Result;
use crate::observability::metrics;
use crate::types::{CleanedRecord, ProcessingStatus, RawApproachRecord};

/// Type coercion, rounding, timezone shift, dedup and audit flagging of
/// raw feed records. Never fails on bad data: unreadable values become
/// `None` and feed the missing-data flag.
pub struct Cleaner {
    config: CleaningConfig,
    target_offset: FixedOffset,
    bracket_pattern: Regex,
}

impl Cleaner {
    pub fn new(config: CleaningConfig) -> Result<Self> {
        let target_offset = config.target_offset()?;
        Ok(Self {
            config,
            target_offset,
            bracket_pattern: Regex::new(r"[()]").expect("static pattern"),
        })
    }

    pub fn clean(&self, raw: &[RawApproachRecord]) -> Vec<CleanedRecord> {
        let mut seen_ids = HashSet::new();
        let mut cleaned = Vec::with_capacity(raw.len());

        for record in raw {
            let Some(nasa_id) = record.nasa_id.as_ref().and_then(coerce_string) else {
                debug!("dropping record without nasa_id");
                metrics::clean::record_dropped("missing_nasa_id");
                continue;
            };
            let Some(distance) = record.closest_approach_distance_km.as_ref().and_then(coerce_f64) else {
                debug!(nasa_id = %nasa_id, "dropping record without distance");
                metrics::clean::record_dropped("missing_distance");
                continue;
            };
            if !seen_ids.insert(nasa_id.clone()) {
                debug!(nasa_id = %nasa_id, "dropping duplicate nasa_id");
                metrics::clean::record_dropped("duplicate");
                continue;
            }

            let record = self.clean_record(record, nasa_id, distance);
            if record.is_missing_data {
                metrics::clean::record_flagged("missing_data");
            }
            if record.is_outlier {
                metrics::clean::record_flagged("outlier");
            }
            cleaned.push(record);
        }

        info!(input = raw.len(), output = cleaned.len(), "cleaned approach records");
        cleaned
    }

    fn clean_record(&self, raw: &RawApproachRecord, nasa_id: String, distance: f64) -> CleanedRecord {
        let asteroid_name = raw
            .asteroid_name
            .as_ref()
            .and_then(coerce_string)
            .map(|name| self.normalize_name(&name));
        let nasa_site_url = raw.nasa_site_url.as_ref().and_then(coerce_string);
        let closest_approach_time = raw
            .closest_approach_time
            .as_ref()
            .and_then(coerce_string)
            .and_then(|text| self.parse_approach_time(&text));

        let closest_approach_distance_km = round2(distance);
        let velocity_kmph = raw.velocity_kmph.as_ref().and_then(coerce_f64).map(round2);
        let diameter_min_m = raw.diameter_min_m.as_ref().and_then(coerce_f64).map(round2);
        let diameter_max_m = raw.diameter_max_m.as_ref().and_then(coerce_f64).map(round2);
        let hazard_flag = raw
            .is_potentially_hazardous
            .as_ref()
            .and_then(coerce_string)
            .map(|flag| flag.to_lowercase());

        let is_missing_data = asteroid_name.is_none()
            || closest_approach_time.is_none()
            || velocity_kmph.is_none()
            || diameter_max_m.is_none()
            || hazard_flag.is_none();

        let is_outlier = !self.config.distance_km.contains(closest_approach_distance_km)
            || velocity_kmph.is_some_and(|v| !self.config.velocity_kmph.contains(v));

        CleanedRecord {
            nasa_id,
            asteroid_name,
            nasa_site_url,
            closest_approach_time,
            closest_approach_distance_km,
            velocity_kmph,
            diameter_min_m,
            diameter_max_m,
            hazard_flag,
            is_missing_data,
            is_outlier,
            processing_status: ProcessingStatus::Cleaned,
        }
    }

    /// Strip brackets and uppercase, e.g. `(2010 PK9)` -> `2010 PK9`.
    fn normalize_name(&self, name: &str) -> String {
        self.bracket_pattern.replace_all(name, "").trim().to_uppercase()
    }

    /// Parse the feed timestamp as UTC and shift it to the target offset.
    fn parse_approach_time(&self, text: &str) -> Option<chrono::DateTime<FixedOffset>> {
        match NaiveDateTime::parse_from_str(text.trim(), &self.config.source_time_format) {
            Ok(naive) => Some(Utc.from_utc_datetime(&naive).with_timezone(&self.target_offset)),
            Err(e) => {
                debug!(value = %text, error = %e, "unparseable approach time");
                None
            }
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Numbers and numeric strings; anything else (including NaN) is `None`.
pub(crate) fn coerce_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Strings, numbers and booleans as text; blank strings are `None`.
pub(crate) fn coerce_string(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cleaner() -> Cleaner {
        Cleaner::new(CleaningConfig::default()).unwrap()
    }

    fn raw(id: &str, distance: Value) -> RawApproachRecord {
        RawApproachRecord {
            asteroid_name: Some(json!("(2010 pk9)")),
            nasa_id: Some(json!(id)),
            nasa_site_url: Some(json!("https://ssd.jpl.nasa.gov/x")),
            closest_approach_time: Some(json!("2024-Jan-01 07:13")),
            closest_approach_distance_km: Some(distance),
            velocity_kmph: Some(json!("54232.126")),
            diameter_min_m: Some(json!(113.456)),
            diameter_max_m: Some(json!(253.644)),
            is_potentially_hazardous: Some(json!(true)),
        }
    }

    #[test]
    fn test_clean_coerces_rounds_and_shifts_timezone() {
        let out = cleaner().clean(&[raw("1", json!("4512345.789"))]);
        assert_eq!(out.len(), 1);
        let r = &out[0];

        assert_eq!(r.asteroid_name.as_deref(), Some("2010 PK9"));
        assert_eq!(r.closest_approach_distance_km, 4_512_345.79);
        assert_eq!(r.velocity_kmph, Some(54_232.13));
        assert_eq!(r.diameter_min_m, Some(113.46));
        assert_eq!(r.diameter_max_m, Some(253.64));
        assert_eq!(r.hazard_flag.as_deref(), Some("true"));
        assert_eq!(
            r.closest_approach_time.unwrap().to_rfc3339(),
            "2024-01-01T12:43:00+05:30"
        );
        assert!(!r.is_missing_data);
        assert!(!r.is_outlier);
        assert_eq!(r.processing_status, ProcessingStatus::Cleaned);
    }

    #[test]
    fn test_clean_drops_missing_id_and_distance() {
        let mut no_id = raw("x", json!(500000.0));
        no_id.nasa_id = None;
        let mut blank_id = raw("x", json!(500000.0));
        blank_id.nasa_id = Some(json!("  "));
        let mut no_distance = raw("2", json!(1.0));
        no_distance.closest_approach_distance_km = None;
        let bad_distance = raw("3", json!("far away"));

        let out = cleaner().clean(&[no_id, blank_id, no_distance, bad_distance, raw("4", json!(500000))]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].nasa_id, "4");
    }

    #[test]
    fn test_clean_keeps_first_duplicate() {
        let mut second = raw("7", json!(900000));
        second.asteroid_name = Some(json!("SECOND"));
        let out = cleaner().clean(&[raw("7", json!(800000)), second, raw("8", json!(800000))]);

        let ids: Vec<&str> = out.iter().map(|r| r.nasa_id.as_str()).collect();
        assert_eq!(ids, vec!["7", "8"]);
        assert_eq!(out[0].closest_approach_distance_km, 800_000.0);
    }

    #[test]
    fn test_clean_flags_missing_data_without_failing() {
        let mut record = raw("5", json!(800000));
        record.closest_approach_time = Some(json!("not a date"));
        record.velocity_kmph = Some(json!("fast"));
        record.is_potentially_hazardous = None;

        let out = cleaner().clean(&[record]);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_missing_data);
        assert_eq!(out[0].closest_approach_time, None);
        assert_eq!(out[0].velocity_kmph, None);
        assert!(!out[0].is_outlier);
    }

    #[test]
    fn test_clean_flags_outliers_from_config() {
        let near = raw("1", json!(50_000));
        let mut slow = raw("2", json!(800_000));
        slow.velocity_kmph = Some(json!(6_999.0));
        let inside = raw("3", json!(100_000));

        let out = cleaner().clean(&[near, slow, inside]);
        assert!(out[0].is_outlier);
        assert!(out[1].is_outlier);
        assert!(!out[2].is_outlier);

        let mut config = CleaningConfig::default();
        config.distance_km.min = 10_000.0;
        let relaxed = Cleaner::new(config).unwrap().clean(&[raw("1", json!(50_000))]);
        assert!(!relaxed[0].is_outlier);
    }

    #[test]
    fn test_clean_accepts_numeric_ids_and_textual_flags() {
        let mut record = raw("ignored", json!(800000));
        record.nasa_id = Some(json!(3542519));
        record.is_potentially_hazardous = Some(json!(" YES "));

        let out = cleaner().clean(&[record]);
        assert_eq!(out[0].nasa_id, "3542519");
        assert_eq!(out[0].hazard_flag.as_deref(), Some("yes"));
    }
}
