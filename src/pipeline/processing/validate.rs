use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::observability::metrics;
use crate::types::{EnrichedRecord, ValidationResult};

/// One batch-level check. Each check inspects the whole batch and returns
/// a violation description when it fails.
type Check = fn(&[EnrichedRecord], DateTime<Utc>) -> Option<String>;

/// Batch validator. Every check runs and every violation is reported;
/// nothing short-circuits and the input is never modified.
pub struct Validator {
    checks: Vec<(&'static str, Check)>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    pub fn new() -> Self {
        Self {
            checks: vec![
                ("schema", check_schema),
                ("unique_nasa_id", check_unique_nasa_id),
                ("unique_data_id", check_unique_data_id),
                ("distance", check_distance),
                ("velocity", check_velocity),
                ("diameter_sign", check_diameter_sign),
                ("diameter_order", check_diameter_order),
                ("hazard_score", check_hazard_score),
                ("velocity_category", check_velocity_category),
                ("risk_level", check_risk_level),
                ("size_category", check_size_category),
                ("created_at", check_created_at),
            ],
        }
    }

    /// Validate against the clock reading `now`.
    ///
    /// Business-rule failures come back as a failed [`ValidationResult`].
    /// Only an empty batch, which has no data model to check at all, is an
    /// error.
    pub fn validate(&self, records: &[EnrichedRecord], now: DateTime<Utc>) -> Result<ValidationResult> {
        if records.is_empty() {
            return Err(PipelineError::EmptyBatch);
        }

        let violations: Vec<String> = self
            .checks
            .iter()
            .filter_map(|(_, check)| check(records, now))
            .collect();

        let result = ValidationResult::from_violations(violations);
        metrics::validation::run_completed(result.passed, result.violations.len());
        if result.passed {
            info!(records = records.len(), "validation passed");
        } else {
            for violation in &result.violations {
                warn!(violation = %violation, "validation check failed");
            }
        }
        Ok(result)
    }
}

fn check_schema(records: &[EnrichedRecord], _: DateTime<Utc>) -> Option<String> {
    let mut missing: Vec<&str> = Vec::new();
    for record in records {
        for field in record.missing_identity_fields() {
            if !missing.contains(&field) {
                missing.push(field);
            }
        }
    }
    (!missing.is_empty()).then(|| format!("Missing required fields: {:?}", missing))
}

fn check_unique_nasa_id(records: &[EnrichedRecord], _: DateTime<Utc>) -> Option<String> {
    has_duplicates(records.iter().map(|r| r.nasa_id.as_str()))
        .then(|| "Duplicate nasa_id found".to_string())
}

fn check_unique_data_id(records: &[EnrichedRecord], _: DateTime<Utc>) -> Option<String> {
    has_duplicates(records.iter().map(|r| r.data_id.as_str()))
        .then(|| "Duplicate data_id found".to_string())
}

fn check_distance(records: &[EnrichedRecord], _: DateTime<Utc>) -> Option<String> {
    records
        .iter()
        .any(|r| !(r.closest_approach_distance_km > 0.0))
        .then(|| "Invalid values in closest_approach_distance_km (should be > 0)".to_string())
}

fn check_velocity(records: &[EnrichedRecord], _: DateTime<Utc>) -> Option<String> {
    records
        .iter()
        .any(|r| r.velocity_kmph.is_some_and(|v| v <= 0.0))
        .then(|| "Invalid values in velocity_kmph (should be > 0)".to_string())
}

fn check_diameter_sign(records: &[EnrichedRecord], _: DateTime<Utc>) -> Option<String> {
    records
        .iter()
        .any(|r| r.diameter_min_m.is_some_and(|d| d < 0.0) || r.diameter_max_m.is_some_and(|d| d < 0.0))
        .then(|| "Negative diameters detected".to_string())
}

fn check_diameter_order(records: &[EnrichedRecord], _: DateTime<Utc>) -> Option<String> {
    records
        .iter()
        .any(|r| matches!((r.diameter_min_m, r.diameter_max_m), (Some(min), Some(max)) if min > max))
        .then(|| "diameter_min_m greater than diameter_max_m".to_string())
}

fn check_hazard_score(records: &[EnrichedRecord], _: DateTime<Utc>) -> Option<String> {
    records
        .iter()
        .any(|r| r.hazard_score.is_some_and(|s| !(0.0..=1.0).contains(&s)))
        .then(|| "hazard_score out of [0, 1] range".to_string())
}

// The category enums are closed vocabularies; an absent category is the
// only way a record can fall outside them.
fn check_velocity_category(records: &[EnrichedRecord], _: DateTime<Utc>) -> Option<String> {
    records
        .iter()
        .any(|r| r.velocity_category.is_none())
        .then(|| "Unexpected values in velocity_category".to_string())
}

fn check_risk_level(records: &[EnrichedRecord], _: DateTime<Utc>) -> Option<String> {
    records
        .iter()
        .any(|r| r.risk_level.is_none())
        .then(|| "Unexpected values in risk_level".to_string())
}

fn check_size_category(records: &[EnrichedRecord], _: DateTime<Utc>) -> Option<String> {
    records
        .iter()
        .any(|r| r.size_category.is_none())
        .then(|| "Unexpected values in size_category".to_string())
}

fn check_created_at(records: &[EnrichedRecord], now: DateTime<Utc>) -> Option<String> {
    records
        .iter()
        .any(|r| r.created_at > now)
        .then(|| "created_at has future dates".to_string())
}

fn has_duplicates<'a>(values: impl Iterator<Item = &'a str>) -> bool {
    let mut seen = HashSet::new();
    values.into_iter().any(|v| !seen.insert(v))
}
