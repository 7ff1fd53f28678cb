//! Structured payloads handed to the notification sinks.
//!
//! Rendering and transport belong to the sink; this module only decides
//! which message kind applies and what it carries.

use serde::{Deserialize, Serialize};

use crate::constants::{
    SUBJECT_LOAD_FAILED, SUBJECT_LOAD_SKIPPED, SUBJECT_LOAD_SUCCESS, SUBJECT_PIPELINE_HALTED, SUBJECT_THREAT_ALERT,
};
use crate::types::{LoadOutcome, ThreatEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    Success,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationPayload {
    ThreatAlert {
        threats: Vec<ThreatEvent>,
    },
    LoadStatus {
        status: LoadStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        table: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        batch_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        record_count: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    PipelineHalted {
        violations: Vec<String>,
    },
}

impl NotificationPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationPayload::ThreatAlert { .. } => "threat_alert",
            NotificationPayload::LoadStatus { .. } => "load_status",
            NotificationPayload::PipelineHalted { .. } => "pipeline_halted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub recipients: Vec<String>,
    pub subject: String,
    pub payload: NotificationPayload,
}

impl Notification {
    /// `None` when the Monitor raised nothing.
    pub fn threat_alert(recipients: &[String], threats: &[ThreatEvent]) -> Option<Self> {
        if threats.is_empty() {
            return None;
        }
        Some(Self {
            recipients: recipients.to_vec(),
            subject: SUBJECT_THREAT_ALERT.to_string(),
            payload: NotificationPayload::ThreatAlert { threats: threats.to_vec() },
        })
    }

    pub fn load_status(recipients: &[String], outcome: &LoadOutcome) -> Self {
        let (subject, payload) = match outcome {
            LoadOutcome::Loaded { schema, table, batch_id, record_count } => (
                SUBJECT_LOAD_SUCCESS,
                NotificationPayload::LoadStatus {
                    status: LoadStatus::Success,
                    schema: Some(schema.clone()),
                    table: Some(table.clone()),
                    batch_id: Some(batch_id.clone()),
                    record_count: Some(*record_count),
                    reason: None,
                },
            ),
            LoadOutcome::Skipped => (
                SUBJECT_LOAD_SKIPPED,
                NotificationPayload::LoadStatus {
                    status: LoadStatus::Skipped,
                    schema: None,
                    table: None,
                    batch_id: None,
                    record_count: None,
                    reason: None,
                },
            ),
            LoadOutcome::Failed { reason } => (
                SUBJECT_LOAD_FAILED,
                NotificationPayload::LoadStatus {
                    status: LoadStatus::Failed,
                    schema: None,
                    table: None,
                    batch_id: None,
                    record_count: None,
                    reason: Some(reason.clone()),
                },
            ),
        };
        Self {
            recipients: recipients.to_vec(),
            subject: subject.to_string(),
            payload,
        }
    }

    pub fn pipeline_halted(recipients: &[String], violations: &[String]) -> Self {
        Self {
            recipients: recipients.to_vec(),
            subject: SUBJECT_PIPELINE_HALTED.to_string(),
            payload: NotificationPayload::PipelineHalted { violations: violations.to_vec() },
        }
    }
}
