use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_PATH: &str = "neo_watch.toml";

/// Every knob the stages read. Built once and handed to each stage at
/// construction; no stage reads the environment on its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub feed: FeedConfig,
    pub cleaning: CleaningConfig,
    pub transform: TransformConfig,
    pub monitor: MonitorConfig,
    pub storage: StorageConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub base_url: String,
    /// Never serialized back out; supplied through `NASA_NEO_API_KEY`
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Hours before and after "now" covered by one fetch
    pub half_window_hours: i64,
    pub timeout_seconds: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.nasa.gov/neo/rest/v1/feed".to_string(),
            api_key: None,
            half_window_hours: 12,
            timeout_seconds: 30,
        }
    }
}

/// Inclusive `[min, max]` range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    /// chrono format of the feed's approach timestamp
    pub source_time_format: String,
    /// Fixed offset east of UTC applied to approach timestamps
    pub target_utc_offset_minutes: i32,
    pub distance_km: Range,
    pub velocity_kmph: Range,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            source_time_format: "%Y-%b-%d %H:%M".to_string(),
            target_utc_offset_minutes: 330,
            distance_km: Range::new(100_000.0, 110_000_000.0),
            velocity_kmph: Range::new(7_000.0, 99_000.0),
        }
    }
}

impl CleaningConfig {
    pub fn target_offset(&self) -> Result<FixedOffset> {
        self.target_utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                PipelineError::Config(format!(
                    "target_utc_offset_minutes {} is outside +/-24h",
                    self.target_utc_offset_minutes
                ))
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityBands {
    /// Below this is `slow`
    pub slow_below: f64,
    /// Below this (and not slow) is `moderate`, otherwise `fast`
    pub moderate_below: f64,
}

impl Default for VelocityBands {
    fn default() -> Self {
        Self {
            slow_below: 25_000.0,
            moderate_below: 65_000.0,
        }
    }
}

/// Lower edges of the risk buckets; each bucket includes its lower edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskBands {
    pub medium_from: f64,
    pub high_from: f64,
    pub critical_from: f64,
}

impl Default for RiskBands {
    fn default() -> Self {
        Self {
            medium_from: 0.2,
            high_from: 0.5,
            critical_from: 0.8,
        }
    }
}

/// Upper edges (inclusive) of the size buckets in metres.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeBands {
    pub small_max: f64,
    pub medium_max: f64,
    pub large_max: f64,
}

impl Default for SizeBands {
    fn default() -> Self {
        Self {
            small_max: 70.0,
            medium_max: 180.0,
            large_max: 350.0,
        }
    }
}

/// Fallback rule for records whose hazard flag is absent or unreadable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HazardHeuristic {
    pub min_diameter_max_m: f64,
    pub max_distance_km: f64,
    pub min_velocity_kmph: f64,
}

impl Default for HazardHeuristic {
    fn default() -> Self {
        Self {
            min_diameter_max_m: 150.0,
            max_distance_km: 1_000_000.0,
            min_velocity_kmph: 8_000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub velocity_bands: VelocityBands,
    pub risk_bands: RiskBands,
    pub size_bands: SizeBands,
    pub hazard_heuristic: HazardHeuristic,
    /// Distance under which an approach counts as close
    pub close_approach_km: f64,
    /// Decimal places kept on the hazard score
    pub hazard_score_precision: u32,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            velocity_bands: VelocityBands::default(),
            risk_bands: RiskBands::default(),
            size_bands: SizeBands::default(),
            hazard_heuristic: HazardHeuristic::default(),
            close_approach_km: 750_000.0,
            hazard_score_precision: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub very_close_km: f64,
    pub extreme_velocity_kmph: f64,
    pub large_diameter_m: f64,
    pub high_hazard_score: f64,
    /// Scan the batch for threats even when validation fails
    pub run_on_validation_failure: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            very_close_km: 1_500_000.0,
            extreme_velocity_kmph: 100_000.0,
            large_diameter_m: 400.0,
            high_hazard_score: 0.8,
            run_on_validation_failure: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub schema: String,
    pub table: String,
    pub audit_table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/neo_watch.db"),
            schema: "neo".to_string(),
            table: "near_earth_objects".to_string(),
            audit_table: "load_audit".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub recipients: Vec<String>,
    /// NDJSON file receiving every notification payload
    pub outbox_path: Option<PathBuf>,
}

impl Config {
    /// Load from `path` (or [`DEFAULT_CONFIG_PATH`] when present), apply
    /// environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Config::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&config_content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Overlay values from the environment. `lookup` is injected so tests
    /// don't have to mutate process state.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("NASA_NEO_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.feed.api_key = Some(key);
        }
        if let Some(url) = lookup("NEO_FEED_URL") {
            self.feed.base_url = url;
        }
        if let Some(db_path) = lookup("NEO_DB_PATH") {
            self.storage.database_path = PathBuf::from(db_path);
        }
        if let Some(schema) = lookup("NEO_SCHEMA_NAME") {
            self.storage.schema = schema;
        }
        if let Some(table) = lookup("NEO_TABLE_NAME") {
            self.storage.table = table;
        }
        if let Some(audit) = lookup("NEO_AUDIT_TABLE") {
            self.storage.audit_table = audit;
        }
        if let Some(recipients) = lookup("RECIPIENT_EMAILS") {
            self.notify.recipients = parse_recipients(&recipients);
        }
        if let Some(outbox) = lookup("NEO_OUTBOX_PATH") {
            self.notify.outbox_path = Some(PathBuf::from(outbox));
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        for (name, range) in [
            ("cleaning.distance_km", self.cleaning.distance_km),
            ("cleaning.velocity_kmph", self.cleaning.velocity_kmph),
        ] {
            if range.min > range.max {
                problems.push(format!("{} has min {} above max {}", name, range.min, range.max));
            }
        }
        if let Err(e) = self.cleaning.target_offset() {
            problems.push(e.to_string());
        }

        let v = &self.transform.velocity_bands;
        if v.slow_below > v.moderate_below {
            problems.push("transform.velocity_bands must be non-decreasing".to_string());
        }
        let r = &self.transform.risk_bands;
        if !(0.0 <= r.medium_from
            && r.medium_from <= r.high_from
            && r.high_from <= r.critical_from
            && r.critical_from <= 1.0)
        {
            problems.push("transform.risk_bands must be non-decreasing within [0, 1]".to_string());
        }
        let s = &self.transform.size_bands;
        if !(0.0 <= s.small_max && s.small_max <= s.medium_max && s.medium_max <= s.large_max) {
            problems.push("transform.size_bands must be non-decreasing and non-negative".to_string());
        }

        if self.feed.half_window_hours <= 0 {
            problems.push("feed.half_window_hours must be positive".to_string());
        }
        for (name, value) in [
            ("storage.schema", &self.storage.schema),
            ("storage.table", &self.storage.table),
            ("storage.audit_table", &self.storage.audit_table),
        ] {
            if value.trim().is_empty() {
                problems.push(format!("{} must not be empty", name));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Config(problems.join("; ")))
        }
    }
}

/// Split a comma-separated recipient list, dropping blanks.
pub fn parse_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cleaning.target_offset().unwrap().local_minus_utc(), 330 * 60);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [cleaning]
            target_utc_offset_minutes = 0

            [cleaning.distance_km]
            min = 1.0
            max = 2.0

            [storage]
            table = "approaches"
            "#,
        )
        .unwrap();

        assert_eq!(config.cleaning.target_utc_offset_minutes, 0);
        assert_eq!(config.cleaning.distance_km, Range::new(1.0, 2.0));
        assert_eq!(config.cleaning.velocity_kmph, Range::new(7_000.0, 99_000.0));
        assert_eq!(config.storage.table, "approaches");
        assert_eq!(config.storage.schema, "neo");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("NASA_NEO_API_KEY", "secret"),
            ("NEO_TABLE_NAME", "neo_feed"),
            ("RECIPIENT_EMAILS", " a@example.com, ,b@example.com "),
        ]);
        let mut config = Config::default();
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.feed.api_key.as_deref(), Some("secret"));
        assert_eq!(config.storage.table, "neo_feed");
        assert_eq!(config.notify.recipients, vec!["a@example.com", "b@example.com"]);
    }

    #[test]
    fn test_validate_rejects_inverted_bands() {
        let mut config = Config::default();
        config.transform.risk_bands.high_from = 0.1;
        config.cleaning.velocity_kmph = Range::new(10.0, 1.0);

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("risk_bands"));
        assert!(err.contains("cleaning.velocity_kmph"));
    }

    #[test]
    fn test_validate_rejects_bad_offset() {
        let mut config = Config::default();
        config.cleaning.target_utc_offset_minutes = 24 * 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_huge_offset_is_a_config_error() {
        let mut config = Config::default();
        config.cleaning.target_utc_offset_minutes = i32::MAX;
        assert!(matches!(config.cleaning.target_offset(), Err(PipelineError::Config(_))));
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }
}
