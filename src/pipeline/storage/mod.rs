// Persistent storage for approach records and the load audit trail

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use sqlite::SqliteStore;

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use thiserror::Error;

use crate::types::{AuditRow, EnrichedRecord, ProcessingStatus};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Schema {0} does not exist")]
    MissingSchema(String),

    #[error("Table {0} does not exist")]
    MissingTable(String),

    #[error("Store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Outcome of a bulk insert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertReport {
    pub inserted: usize,
    /// Rows skipped because their nasa_id was already persisted
    pub conflicted: usize,
}

/// Storage service used by the Loader.
///
/// `nasa_id` carries a uniqueness constraint in every implementation; a
/// conflicting row is skipped and counted, never overwritten.
pub trait ApproachStore {
    fn ensure_schema(&self, schema: &str) -> StoreResult<()>;

    fn table_exists(&self, schema: &str, table: &str) -> StoreResult<bool>;

    fn create_approach_table(&self, schema: &str, table: &str) -> StoreResult<()>;

    fn existing_nasa_ids(&self, schema: &str, table: &str) -> StoreResult<HashSet<String>>;

    fn insert_approaches(&self, schema: &str, table: &str, records: &[EnrichedRecord]) -> StoreResult<InsertReport>;

    /// Set `processing_status` on rows of `batch_id` only; returns rows touched.
    fn mark_batch(&self, schema: &str, table: &str, batch_id: &str, status: ProcessingStatus) -> StoreResult<usize>;

    fn ensure_audit_table(&self, schema: &str, audit_table: &str) -> StoreResult<()>;

    /// Insert-or-ignore on `batch_id`; returns whether a row was written.
    fn insert_audit_row(&self, schema: &str, audit_table: &str, row: &AuditRow) -> StoreResult<bool>;
}

/// Schema and table names are interpolated into SQL, so only plain
/// identifiers are accepted.
pub fn checked_identifier(name: &str) -> StoreResult<&str> {
    static IDENTIFIER: OnceLock<Regex> = OnceLock::new();
    let pattern = IDENTIFIER.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("static pattern"));
    if pattern.is_match(name) {
        Ok(name)
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}
