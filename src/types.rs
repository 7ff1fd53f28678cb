use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One approach entry as handed over by the feed source.
///
/// Every field is loosely typed: the feed is semi-structured and type
/// coercion is the Cleaner's job, not the deserializer's.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawApproachRecord {
    #[serde(default)]
    pub asteroid_name: Option<Value>,
    #[serde(default)]
    pub nasa_id: Option<Value>,
    #[serde(default)]
    pub nasa_site_url: Option<Value>,
    /// Approach time in the source timezone, e.g. `2024-Jan-01 12:34`
    #[serde(default)]
    pub closest_approach_time: Option<Value>,
    #[serde(default)]
    pub closest_approach_distance_km: Option<Value>,
    #[serde(default)]
    pub velocity_kmph: Option<Value>,
    #[serde(default)]
    pub diameter_min_m: Option<Value>,
    #[serde(default)]
    pub diameter_max_m: Option<Value>,
    #[serde(default)]
    pub is_potentially_hazardous: Option<Value>,
}

/// Audit trail marker carried on every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingStatus {
    #[serde(rename = "cleaned")]
    Cleaned,
    #[serde(rename = "transformed")]
    Transformed,
    #[serde(rename = "loaded to db")]
    Loaded,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Cleaned => "cleaned",
            ProcessingStatus::Transformed => "transformed",
            ProcessingStatus::Loaded => "loaded to db",
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw record after type coercion, rounding, timezone shift and flagging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedRecord {
    pub nasa_id: String,
    pub asteroid_name: Option<String>,
    pub nasa_site_url: Option<String>,
    pub closest_approach_time: Option<DateTime<FixedOffset>>,
    pub closest_approach_distance_km: f64,
    pub velocity_kmph: Option<f64>,
    pub diameter_min_m: Option<f64>,
    pub diameter_max_m: Option<f64>,
    /// Hazard flag as lowercase text; resolved to a boolean by the Transformer
    pub hazard_flag: Option<String>,
    pub is_missing_data: bool,
    pub is_outlier: bool,
    pub processing_status: ProcessingStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VelocityCategory {
    Slow,
    Moderate,
    Fast,
}

impl VelocityCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            VelocityCategory::Slow => "slow",
            VelocityCategory::Moderate => "moderate",
            VelocityCategory::Fast => "fast",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
            RiskLevel::Critical => "Critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeCategory {
    Small,
    Medium,
    Large,
    VeryLarge,
}

impl SizeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeCategory::Small => "small",
            SizeCategory::Medium => "medium",
            SizeCategory::Large => "large",
            SizeCategory::VeryLarge => "very_large",
        }
    }
}

/// Fully derived record. Field order is the column contract shared by the
/// Validator and the storage layer (see [`EnrichedRecord::COLUMNS`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub nasa_id: String,
    pub asteroid_name: Option<String>,
    pub closest_approach_time: Option<DateTime<FixedOffset>>,
    pub closest_approach_distance_km: f64,
    pub velocity_kmph: Option<f64>,
    pub diameter_min_m: Option<f64>,
    pub diameter_max_m: Option<f64>,
    pub nasa_site_url: String,
    pub is_potentially_hazardous: bool,
    pub velocity_category: Option<VelocityCategory>,
    pub hazard_score: Option<f64>,
    pub risk_level: Option<RiskLevel>,
    pub size_category: Option<SizeCategory>,
    pub is_close: bool,
    pub is_missing_data: bool,
    pub is_outlier: bool,
    pub is_deleted: bool,
    pub processing_status: ProcessingStatus,
    pub created_at: DateTime<Utc>,
    pub data_id: String,
    pub batch_id: String,
}

impl EnrichedRecord {
    pub const COLUMNS: [&'static str; 21] = [
        "nasa_id",
        "asteroid_name",
        "closest_approach_time",
        "closest_approach_distance_km",
        "velocity_kmph",
        "diameter_min_m",
        "diameter_max_m",
        "nasa_site_url",
        "is_potentially_hazardous",
        "velocity_category",
        "hazard_score",
        "risk_level",
        "size_category",
        "is_close",
        "is_missing_data",
        "is_outlier",
        "is_deleted",
        "processing_status",
        "created_at",
        "data_id",
        "batch_id",
    ];

    /// Names of identity columns that are empty on this record.
    pub fn missing_identity_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.nasa_id.trim().is_empty() {
            missing.push("nasa_id");
        }
        if self.data_id.trim().is_empty() {
            missing.push("data_id");
        }
        if self.batch_id.trim().is_empty() {
            missing.push("batch_id");
        }
        if self.nasa_site_url.trim().is_empty() {
            missing.push("nasa_site_url");
        }
        missing
    }
}

/// Pass/fail verdict of the Validator with every violation found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub violations: Vec<String>,
}

impl ValidationResult {
    pub fn from_violations(violations: Vec<String>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }
}

/// Result of one Loader invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoadOutcome {
    /// Every natural id in the batch was already persisted
    Skipped,
    Loaded {
        schema: String,
        table: String,
        batch_id: String,
        record_count: usize,
    },
    Failed { reason: String },
}

impl LoadOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            LoadOutcome::Skipped => "skipped",
            LoadOutcome::Loaded { .. } => "loaded",
            LoadOutcome::Failed { .. } => "failed",
        }
    }
}

/// One row of the per-batch load audit table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRow {
    pub batch_id: String,
    pub date: chrono::NaiveDate,
    pub time: chrono::NaiveTime,
    pub record_count: usize,
}

/// Alert raised by the Monitor for a single record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatEvent {
    pub nasa_id: String,
    pub asteroid_name: Option<String>,
    /// Serialized approach time; never a temporal type past the Monitor
    pub closest_approach_time: String,
    pub alerts: Vec<String>,
    pub url: String,
}
