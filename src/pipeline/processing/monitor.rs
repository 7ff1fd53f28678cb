use tracing::info;

use crate::config::MonitorConfig;
use crate::constants::{
    ALERT_EXTREME_VELOCITY, ALERT_FLAGGED_HAZARD, ALERT_HIGH_HAZARD_SCORE, ALERT_LARGE_ASTEROID,
    ALERT_VERY_CLOSE_APPROACH, THREAT_TIME_FORMAT,
};
use crate::observability::metrics;
use crate::types::{EnrichedRecord, ThreatEvent};

/// Scans enriched records for threat conditions. Rules are independent;
/// one record can trigger several labels.
pub struct Monitor {
    config: MonitorConfig,
}

impl Monitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self { config }
    }

    pub fn scan(&self, records: &[EnrichedRecord]) -> Vec<ThreatEvent> {
        let threats: Vec<ThreatEvent> = records.iter().filter_map(|r| self.evaluate(r)).collect();
        info!(records = records.len(), threats = threats.len(), "threat scan finished");
        threats
    }

    pub fn evaluate(&self, record: &EnrichedRecord) -> Option<ThreatEvent> {
        let c = &self.config;
        let mut alerts = Vec::new();

        if record.closest_approach_distance_km < c.very_close_km {
            alerts.push(ALERT_VERY_CLOSE_APPROACH);
        }
        if record.velocity_kmph.is_some_and(|v| v > c.extreme_velocity_kmph) {
            alerts.push(ALERT_EXTREME_VELOCITY);
        }
        if record.diameter_max_m.is_some_and(|d| d > c.large_diameter_m) {
            alerts.push(ALERT_LARGE_ASTEROID);
        }
        if record.hazard_score.is_some_and(|s| s >= c.high_hazard_score) {
            alerts.push(ALERT_HIGH_HAZARD_SCORE);
        }
        if record.is_potentially_hazardous {
            alerts.push(ALERT_FLAGGED_HAZARD);
        }

        if alerts.is_empty() {
            return None;
        }
        for label in &alerts {
            metrics::monitor::threat_detected(label);
        }

        Some(ThreatEvent {
            nasa_id: record.nasa_id.clone(),
            asteroid_name: record.asteroid_name.clone(),
            closest_approach_time: record
                .closest_approach_time
                .map(|t| t.format(THREAT_TIME_FORMAT).to_string())
                .unwrap_or_default(),
            alerts: alerts.into_iter().map(str::to_string).collect(),
            url: record.nasa_site_url.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ProcessingStatus, RiskLevel, SizeCategory, VelocityCategory};
    use chrono::{FixedOffset, TimeZone, Utc};

    fn record() -> EnrichedRecord {
        EnrichedRecord {
            nasa_id: "3542519".to_string(),
            asteroid_name: Some("2010 PK9".to_string()),
            closest_approach_time: Some(
                FixedOffset::east_opt(19800).unwrap().with_ymd_and_hms(2024, 1, 1, 12, 43, 0).unwrap(),
            ),
            closest_approach_distance_km: 2_000_000.0,
            velocity_kmph: Some(50_000.0),
            diameter_min_m: Some(50.0),
            diameter_max_m: Some(100.0),
            nasa_site_url: "https://ssd.jpl.nasa.gov/x".to_string(),
            is_potentially_hazardous: false,
            velocity_category: Some(VelocityCategory::Moderate),
            hazard_score: Some(0.1),
            risk_level: Some(RiskLevel::Low),
            size_category: Some(SizeCategory::Medium),
            is_close: false,
            is_missing_data: false,
            is_outlier: false,
            is_deleted: false,
            processing_status: ProcessingStatus::Transformed,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            data_id: "3542519-0101240000000000000".to_string(),
            batch_id: "20240101000000000".to_string(),
        }
    }

    #[test]
    fn test_quiet_record_raises_nothing() {
        let monitor = Monitor::new(MonitorConfig::default());
        assert!(monitor.scan(&[record()]).is_empty());
    }

    #[test]
    fn test_flagged_hazard_only() {
        let monitor = Monitor::new(MonitorConfig::default());
        let mut flagged = record();
        flagged.is_potentially_hazardous = true;

        let threats = monitor.scan(&[flagged]);
        assert_eq!(threats.len(), 1);
        assert_eq!(threats[0].alerts, vec![ALERT_FLAGGED_HAZARD]);
        assert_eq!(threats[0].closest_approach_time, "2024-01-01T12:43:00+05:30");
        assert_eq!(threats[0].url, "https://ssd.jpl.nasa.gov/x");
    }

    #[test]
    fn test_all_rules_can_fire_together() {
        let monitor = Monitor::new(MonitorConfig::default());
        let mut r = record();
        r.closest_approach_distance_km = 1_499_999.0;
        r.velocity_kmph = Some(100_001.0);
        r.diameter_max_m = Some(400.5);
        r.hazard_score = Some(0.8);
        r.is_potentially_hazardous = true;

        let threat = monitor.evaluate(&r).unwrap();
        assert_eq!(
            threat.alerts,
            vec![
                ALERT_VERY_CLOSE_APPROACH,
                ALERT_EXTREME_VELOCITY,
                ALERT_LARGE_ASTEROID,
                ALERT_HIGH_HAZARD_SCORE,
                ALERT_FLAGGED_HAZARD,
            ]
        );
    }

    #[test]
    fn test_missing_time_serializes_to_empty_string() {
        let monitor = Monitor::new(MonitorConfig::default());
        let mut r = record();
        r.closest_approach_time = None;
        r.diameter_max_m = Some(1_000.0);

        let threat = monitor.evaluate(&r).unwrap();
        assert_eq!(threat.closest_approach_time, "");
        assert_eq!(threat.alerts, vec![ALERT_LARGE_ASTEROID]);
    }
}
