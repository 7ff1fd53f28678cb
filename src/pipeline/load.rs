//! Idempotent incremental load of a validated batch.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::{error, info, instrument};

use crate::config::StorageConfig;
use crate::error::{PipelineError, Result};
use crate::observability::metrics;
use crate::pipeline::storage::{ApproachStore, StoreResult};
use crate::types::{AuditRow, EnrichedRecord, LoadOutcome, ProcessingStatus};

/// Where a batch is loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTarget {
    pub schema: String,
    pub table: String,
    pub audit_table: String,
}

impl From<&StorageConfig> for LoadTarget {
    fn from(config: &StorageConfig) -> Self {
        Self {
            schema: config.schema.clone(),
            table: config.table.clone(),
            audit_table: config.audit_table.clone(),
        }
    }
}

pub struct Loader<S: ApproachStore> {
    store: S,
    target: LoadTarget,
}

impl<S: ApproachStore> Loader<S> {
    pub fn new(store: S, target: LoadTarget) -> Self {
        Self { store, target }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn target(&self) -> &LoadTarget {
        &self.target
    }

    /// Insert the records whose nasa_id is not yet persisted and audit the batch.
    ///
    /// Storage failures are reported as [`LoadOutcome::Failed`]. The only
    /// `Err` is a batch that does not carry exactly one batch id, which is
    /// a broken caller rather than a failed load. `now` stamps the audit row.
    #[instrument(skip_all, fields(records = records.len()))]
    pub fn load(&self, records: &[EnrichedRecord], now: DateTime<Utc>) -> Result<LoadOutcome> {
        let batch_id = single_batch_id(records)?;

        let outcome = match self.load_batch(records, &batch_id, now) {
            Ok(Some(record_count)) => {
                info!(
                    schema = %self.target.schema,
                    table = %self.target.table,
                    batch_id = %batch_id,
                    record_count,
                    "batch loaded"
                );
                LoadOutcome::Loaded {
                    schema: self.target.schema.clone(),
                    table: self.target.table.clone(),
                    batch_id,
                    record_count,
                }
            }
            Ok(None) => {
                info!(batch_id = %batch_id, "no new records to insert, all nasa_id values already exist");
                LoadOutcome::Skipped
            }
            Err(e) => {
                error!(batch_id = %batch_id, error = %e, "failed to load batch");
                LoadOutcome::Failed { reason: e.to_string() }
            }
        };
        metrics::load::outcome(outcome.label());
        Ok(outcome)
    }

    /// `Ok(None)` when nothing new was inserted and the batch was already
    /// complete.
    ///
    /// Marking and auditing are keyed on the batch id rather than on what
    /// this call inserted, so a retry after a failure between the insert and
    /// the audit row finishes the batch instead of skipping it.
    fn load_batch(&self, records: &[EnrichedRecord], batch_id: &str, now: DateTime<Utc>) -> StoreResult<Option<usize>> {
        let LoadTarget { schema, table, audit_table } = &self.target;

        self.store.ensure_schema(schema)?;
        if !self.store.table_exists(schema, table)? {
            self.store.create_approach_table(schema, table)?;
        }

        let existing = self.store.existing_nasa_ids(schema, table)?;
        let new_records: Vec<EnrichedRecord> = records
            .iter()
            .filter(|r| !existing.contains(&r.nasa_id))
            .cloned()
            .collect();

        let mut inserted = 0;
        if !new_records.is_empty() {
            // A concurrent load may have claimed some ids since the read above
            let report = self.store.insert_approaches(schema, table, &new_records)?;
            metrics::load::rows_inserted(report.inserted);
            if report.conflicted > 0 {
                metrics::load::rows_conflicted(report.conflicted);
            }
            inserted = report.inserted;
        }

        let batch_rows = self.store.mark_batch(schema, table, batch_id, ProcessingStatus::Loaded)?;
        if batch_rows == 0 {
            return Ok(None);
        }

        self.store.ensure_audit_table(schema, audit_table)?;
        let audit = AuditRow {
            batch_id: batch_id.to_string(),
            date: now.date_naive(),
            time: now.time(),
            record_count: batch_rows,
        };
        let audited = self.store.insert_audit_row(schema, audit_table, &audit)?;

        match (inserted, audited) {
            (0, false) => Ok(None),
            (0, true) => {
                info!(batch_id, record_count = batch_rows, "completed previously interrupted batch");
                Ok(Some(batch_rows))
            }
            (_, audited) => {
                if !audited {
                    info!(batch_id, "audit row already present for batch");
                }
                Ok(Some(batch_rows))
            }
        }
    }
}

fn single_batch_id(records: &[EnrichedRecord]) -> Result<String> {
    let ids: BTreeSet<&str> = records.iter().map(|r| r.batch_id.as_str()).collect();
    let mut iter = ids.iter();
    match (iter.next(), iter.next()) {
        (Some(id), None) => Ok(id.to_string()),
        _ => Err(PipelineError::Contract(format!(
            "a load must carry exactly one batch_id, found {}",
            ids.len()
        ))),
    }
}
