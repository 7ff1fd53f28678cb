//! Feed payload handling: the fetch window and flattening of the
//! date-keyed `near_earth_objects` mapping into raw approach records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::constants::FEED_DATE_FORMAT;
use crate::error::{PipelineError, Result};
use crate::types::RawApproachRecord;

/// Date window requested from the feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedWindow {
    pub start_date: String,
    pub end_date: String,
}

impl FeedWindow {
    /// Window of `half_width_hours` either side of `now`.
    pub fn around(now: DateTime<Utc>, half_width_hours: i64) -> Self {
        let half = Duration::hours(half_width_hours);
        Self {
            start_date: (now - half).format(FEED_DATE_FORMAT).to_string(),
            end_date: (now + half).format(FEED_DATE_FORMAT).to_string(),
        }
    }
}

/// Flatten a feed response into raw records, in date-key then entry order.
///
/// Entries without approach data are skipped. A payload with no
/// `near_earth_objects` object is a broken source, not bad data, and is
/// rejected.
pub fn parse_feed(payload: &Value) -> Result<Vec<RawApproachRecord>> {
    let by_date = payload
        .get("near_earth_objects")
        .and_then(Value::as_object)
        .ok_or_else(|| {
            PipelineError::MalformedFeed("response has no `near_earth_objects` object".to_string())
        })?;

    let mut records = Vec::new();
    for (date, entries) in by_date {
        let Some(entries) = entries.as_array() else {
            debug!(date = %date, "skipping non-list feed entry");
            continue;
        };
        for entry in entries {
            match raw_record_from_entry(entry) {
                Some(record) => records.push(record),
                None => debug!(date = %date, id = ?entry.get("id"), "entry has no close approach data"),
            }
        }
    }

    info!(records = records.len(), dates = by_date.len(), "parsed feed payload");
    crate::observability::metrics::feed::records_fetched(records.len());
    Ok(records)
}

fn raw_record_from_entry(entry: &Value) -> Option<RawApproachRecord> {
    let approach = entry
        .get("close_approach_data")
        .and_then(Value::as_array)
        .and_then(|list| list.first())?;

    let meters = entry.pointer("/estimated_diameter/meters");
    Some(RawApproachRecord {
        asteroid_name: field(entry, "/name"),
        nasa_id: field(entry, "/id"),
        nasa_site_url: field(entry, "/nasa_jpl_url"),
        closest_approach_time: field(approach, "/close_approach_date_full"),
        closest_approach_distance_km: field(approach, "/miss_distance/kilometers"),
        velocity_kmph: field(approach, "/relative_velocity/kilometers_per_hour"),
        diameter_min_m: meters.and_then(|m| field(m, "/estimated_diameter_min")),
        diameter_max_m: meters.and_then(|m| field(m, "/estimated_diameter_max")),
        is_potentially_hazardous: field(entry, "/is_potentially_hazardous_asteroid"),
    })
}

fn field(value: &Value, pointer: &str) -> Option<Value> {
    value.pointer(pointer).filter(|v| !v.is_null()).cloned()
}
