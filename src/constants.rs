//! Values that are part of the data contract rather than tunable thresholds.

/// Replacement for reference URLs that fail verification
pub const URL_NOT_FOUND: &str = "url not found";

/// Host fragment a reference URL must contain to be kept
pub const TRUSTED_URL_HOST: &str = "nasa.gov";

// Threat labels emitted by the Monitor
pub const ALERT_VERY_CLOSE_APPROACH: &str = "very close approach";
pub const ALERT_EXTREME_VELOCITY: &str = "extremely high velocity";
pub const ALERT_LARGE_ASTEROID: &str = "large asteroid";
pub const ALERT_HIGH_HAZARD_SCORE: &str = "high hazard score";
pub const ALERT_FLAGGED_HAZARD: &str = "flagged hazard";

/// Textual form of approach timestamps leaving the Monitor
pub const THREAT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// Date format the feed expects for its window parameters
pub const FEED_DATE_FORMAT: &str = "%Y-%m-%d";

// Notification subjects
pub const SUBJECT_THREAT_ALERT: &str = "CRITICAL ALERT: Potentially Hazardous Asteroids Detected";
pub const SUBJECT_LOAD_SUCCESS: &str = "NASA Pipeline System Notification: Data Load Success";
pub const SUBJECT_LOAD_SKIPPED: &str = "NASA Pipeline System Notification: Data Load Skipped";
pub const SUBJECT_LOAD_FAILED: &str = "NASA Pipeline System Notification: Data Load Failed";
pub const SUBJECT_PIPELINE_HALTED: &str = "CRITICAL: NASA Pipeline Execution Halted";
