use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::{checked_identifier, ApproachStore, InsertReport, StoreError, StoreResult};
use crate::types::{AuditRow, EnrichedRecord, ProcessingStatus};

#[derive(Default)]
struct State {
    schemas: HashSet<String>,
    tables: HashMap<(String, String), Vec<EnrichedRecord>>,
    audit_tables: HashMap<(String, String), Vec<AuditRow>>,
}

/// In-memory storage implementation for development/testing
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Snapshot of a table's rows in insertion order
    pub fn rows(&self, schema: &str, table: &str) -> Vec<EnrichedRecord> {
        self.lock()
            .map(|s| s.tables.get(&key(schema, table)).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn audit_rows(&self, schema: &str, audit_table: &str) -> Vec<AuditRow> {
        self.lock()
            .map(|s| s.audit_tables.get(&key(schema, audit_table)).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

fn key(schema: &str, table: &str) -> (String, String) {
    (schema.to_string(), table.to_string())
}

fn require_schema(state: &State, schema: &str) -> StoreResult<()> {
    if state.schemas.contains(schema) {
        Ok(())
    } else {
        Err(StoreError::MissingSchema(schema.to_string()))
    }
}

impl ApproachStore for InMemoryStore {
    fn ensure_schema(&self, schema: &str) -> StoreResult<()> {
        let schema = checked_identifier(schema)?;
        self.lock()?.schemas.insert(schema.to_string());
        Ok(())
    }

    fn table_exists(&self, schema: &str, table: &str) -> StoreResult<bool> {
        let state = self.lock()?;
        require_schema(&state, schema)?;
        Ok(state.tables.contains_key(&key(schema, table)))
    }

    fn create_approach_table(&self, schema: &str, table: &str) -> StoreResult<()> {
        checked_identifier(table)?;
        let mut state = self.lock()?;
        require_schema(&state, schema)?;
        state.tables.entry(key(schema, table)).or_default();
        Ok(())
    }

    fn existing_nasa_ids(&self, schema: &str, table: &str) -> StoreResult<HashSet<String>> {
        let state = self.lock()?;
        let rows = state
            .tables
            .get(&key(schema, table))
            .ok_or_else(|| StoreError::MissingTable(format!("{}.{}", schema, table)))?;
        Ok(rows.iter().map(|r| r.nasa_id.clone()).collect())
    }

    fn insert_approaches(&self, schema: &str, table: &str, records: &[EnrichedRecord]) -> StoreResult<InsertReport> {
        let mut state = self.lock()?;
        let rows = state
            .tables
            .get_mut(&key(schema, table))
            .ok_or_else(|| StoreError::MissingTable(format!("{}.{}", schema, table)))?;

        let mut nasa_ids: HashSet<String> = rows.iter().map(|r| r.nasa_id.clone()).collect();
        let mut data_ids: HashSet<String> = rows.iter().map(|r| r.data_id.clone()).collect();
        let mut report = InsertReport::default();
        for record in records {
            if nasa_ids.contains(&record.nasa_id) || data_ids.contains(&record.data_id) {
                debug!(nasa_id = %record.nasa_id, "row already persisted, skipped");
                report.conflicted += 1;
                continue;
            }
            nasa_ids.insert(record.nasa_id.clone());
            data_ids.insert(record.data_id.clone());
            rows.push(record.clone());
            report.inserted += 1;
        }
        Ok(report)
    }

    fn mark_batch(&self, schema: &str, table: &str, batch_id: &str, status: ProcessingStatus) -> StoreResult<usize> {
        let mut state = self.lock()?;
        let rows = state
            .tables
            .get_mut(&key(schema, table))
            .ok_or_else(|| StoreError::MissingTable(format!("{}.{}", schema, table)))?;
        let mut touched = 0;
        for row in rows.iter_mut().filter(|r| r.batch_id == batch_id) {
            row.processing_status = status;
            touched += 1;
        }
        Ok(touched)
    }

    fn ensure_audit_table(&self, schema: &str, audit_table: &str) -> StoreResult<()> {
        checked_identifier(audit_table)?;
        let mut state = self.lock()?;
        require_schema(&state, schema)?;
        state.audit_tables.entry(key(schema, audit_table)).or_default();
        Ok(())
    }

    fn insert_audit_row(&self, schema: &str, audit_table: &str, row: &AuditRow) -> StoreResult<bool> {
        let mut state = self.lock()?;
        let rows = state
            .audit_tables
            .get_mut(&key(schema, audit_table))
            .ok_or_else(|| StoreError::MissingTable(format!("{}.{}", schema, audit_table)))?;
        if rows.iter().any(|r| r.batch_id == row.batch_id) {
            return Ok(false);
        }
        rows.push(row.clone());
        Ok(true)
    }
}
