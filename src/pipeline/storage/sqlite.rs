use chrono::{NaiveDate, NaiveTime};
use rusqlite::{params, types::Type, Connection};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{checked_identifier, ApproachStore, InsertReport, StoreError, StoreResult};
use crate::types::{AuditRow, EnrichedRecord, ProcessingStatus};

const AUDIT_DATE_FORMAT: &str = "%Y-%m-%d";
const AUDIT_TIME_FORMAT: &str = "%H:%M:%S";

/// SQLite-backed store. Schemas map onto attached databases: a file next
/// to the main database (`<stem>.<schema>.db`), or a private in-memory
/// database for [`SqliteStore::open_in_memory`].
pub struct SqliteStore {
    conn: Connection,
    /// Directory and stem used to place schema files; `None` when in memory
    schema_root: Option<(PathBuf, String)>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> StoreResult<Self> {
        let db_path = db_path.as_ref();
        let dir = db_path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let stem = db_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("neo_watch")
            .to_string();

        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Ok(Self { conn, schema_root: Some((dir, stem)) })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self { conn: Connection::open_in_memory()?, schema_root: None })
    }

    fn attached_schemas(&self) -> StoreResult<HashSet<String>> {
        let mut stmt = self.conn.prepare("PRAGMA database_list")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(names)
    }

    fn require_schema(&self, schema: &str) -> StoreResult<()> {
        if self.attached_schemas()?.contains(schema) {
            Ok(())
        } else {
            Err(StoreError::MissingSchema(schema.to_string()))
        }
    }

    pub fn row_count(&self, schema: &str, table: &str) -> StoreResult<usize> {
        let sql = format!(
            r#"SELECT COUNT(*) FROM "{}"."{}""#,
            checked_identifier(schema)?,
            checked_identifier(table)?
        );
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// `(nasa_id, processing_status, batch_id)` for every stored row, by nasa_id.
    pub fn row_statuses(&self, schema: &str, table: &str) -> StoreResult<Vec<(String, String, String)>> {
        let sql = format!(
            r#"SELECT nasa_id, processing_status, batch_id FROM "{}"."{}" ORDER BY nasa_id"#,
            checked_identifier(schema)?,
            checked_identifier(table)?
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn audit_rows(&self, schema: &str, audit_table: &str) -> StoreResult<Vec<AuditRow>> {
        let sql = format!(
            r#"SELECT batch_id, date, time, record_count FROM "{}"."{}" ORDER BY batch_id"#,
            checked_identifier(schema)?,
            checked_identifier(audit_table)?
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                let date: String = row.get(1)?;
                let time: String = row.get(2)?;
                let count: i64 = row.get(3)?;
                Ok(AuditRow {
                    batch_id: row.get(0)?,
                    date: NaiveDate::parse_from_str(&date, AUDIT_DATE_FORMAT)
                        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?,
                    time: NaiveTime::parse_from_str(&time, AUDIT_TIME_FORMAT)
                        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?,
                    record_count: count as usize,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl ApproachStore for SqliteStore {
    fn ensure_schema(&self, schema: &str) -> StoreResult<()> {
        let schema = checked_identifier(schema)?;
        if self.attached_schemas()?.contains(schema) {
            return Ok(());
        }
        let location = match &self.schema_root {
            Some((dir, stem)) => dir.join(format!("{}.{}.db", stem, schema)).to_string_lossy().into_owned(),
            None => ":memory:".to_string(),
        };
        debug!(schema, location = %location, "attaching schema database");
        self.conn
            .execute(&format!(r#"ATTACH DATABASE ?1 AS "{}""#, schema), params![location])?;
        Ok(())
    }

    fn table_exists(&self, schema: &str, table: &str) -> StoreResult<bool> {
        let schema = checked_identifier(schema)?;
        self.require_schema(schema)?;
        let sql = format!(
            r#"SELECT COUNT(*) FROM "{}".sqlite_master WHERE type = 'table' AND name = ?1"#,
            schema
        );
        let count: i64 = self.conn.query_row(&sql, params![table], |row| row.get(0))?;
        Ok(count > 0)
    }

    fn create_approach_table(&self, schema: &str, table: &str) -> StoreResult<()> {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{}"."{}" (
                nasa_id                      TEXT NOT NULL UNIQUE,
                asteroid_name                TEXT,
                closest_approach_time        TEXT,
                closest_approach_distance_km REAL NOT NULL,
                velocity_kmph                REAL,
                diameter_min_m               REAL,
                diameter_max_m               REAL,
                nasa_site_url                TEXT NOT NULL,
                is_potentially_hazardous     INTEGER NOT NULL,
                velocity_category            TEXT,
                hazard_score                 REAL,
                risk_level                   TEXT,
                size_category                TEXT,
                is_close                     INTEGER NOT NULL,
                is_missing_data              INTEGER NOT NULL,
                is_outlier                   INTEGER NOT NULL,
                is_deleted                   INTEGER NOT NULL,
                processing_status            TEXT NOT NULL,
                created_at                   TEXT NOT NULL,
                data_id                      TEXT PRIMARY KEY,
                batch_id                     TEXT NOT NULL
            );
            "#,
            checked_identifier(schema)?,
            checked_identifier(table)?
        );
        self.conn.execute_batch(&sql)?;
        Ok(())
    }

    fn existing_nasa_ids(&self, schema: &str, table: &str) -> StoreResult<HashSet<String>> {
        let sql = format!(
            r#"SELECT nasa_id FROM "{}"."{}""#,
            checked_identifier(schema)?,
            checked_identifier(table)?
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    fn insert_approaches(&self, schema: &str, table: &str, records: &[EnrichedRecord]) -> StoreResult<InsertReport> {
        let columns = EnrichedRecord::COLUMNS.join(", ");
        let placeholders = (1..=EnrichedRecord::COLUMNS.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        // Conflicts on nasa_id (or data_id) skip the row instead of failing the batch
        let sql = format!(
            r#"INSERT INTO "{}"."{}" ({}) VALUES ({}) ON CONFLICT DO NOTHING"#,
            checked_identifier(schema)?,
            checked_identifier(table)?,
            columns,
            placeholders
        );

        let tx = self.conn.unchecked_transaction()?;
        let mut report = InsertReport::default();
        {
            let mut stmt = tx.prepare(&sql)?;
            for r in records {
                let changed = stmt.execute(params![
                    r.nasa_id,
                    r.asteroid_name,
                    r.closest_approach_time.map(|t| t.to_rfc3339()),
                    r.closest_approach_distance_km,
                    r.velocity_kmph,
                    r.diameter_min_m,
                    r.diameter_max_m,
                    r.nasa_site_url,
                    r.is_potentially_hazardous,
                    r.velocity_category.map(|c| c.as_str()),
                    r.hazard_score,
                    r.risk_level.map(|c| c.as_str()),
                    r.size_category.map(|c| c.as_str()),
                    r.is_close,
                    r.is_missing_data,
                    r.is_outlier,
                    r.is_deleted,
                    r.processing_status.as_str(),
                    r.created_at.to_rfc3339(),
                    r.data_id,
                    r.batch_id,
                ])?;
                if changed == 0 {
                    debug!(nasa_id = %r.nasa_id, "row already persisted, skipped");
                    report.conflicted += 1;
                } else {
                    report.inserted += changed;
                }
            }
        }
        tx.commit()?;
        Ok(report)
    }

    fn mark_batch(&self, schema: &str, table: &str, batch_id: &str, status: ProcessingStatus) -> StoreResult<usize> {
        let sql = format!(
            r#"UPDATE "{}"."{}" SET processing_status = ?1 WHERE batch_id = ?2"#,
            checked_identifier(schema)?,
            checked_identifier(table)?
        );
        Ok(self.conn.execute(&sql, params![status.as_str(), batch_id])?)
    }

    fn ensure_audit_table(&self, schema: &str, audit_table: &str) -> StoreResult<()> {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{}"."{}" (
                batch_id     TEXT PRIMARY KEY,
                date         TEXT NOT NULL,
                time         TEXT NOT NULL,
                record_count INTEGER NOT NULL
            );
            "#,
            checked_identifier(schema)?,
            checked_identifier(audit_table)?
        );
        self.conn.execute_batch(&sql)?;
        Ok(())
    }

    fn insert_audit_row(&self, schema: &str, audit_table: &str, row: &AuditRow) -> StoreResult<bool> {
        let sql = format!(
            r#"INSERT INTO "{}"."{}" (batch_id, date, time, record_count) VALUES (?1, ?2, ?3, ?4)
               ON CONFLICT(batch_id) DO NOTHING"#,
            checked_identifier(schema)?,
            checked_identifier(audit_table)?
        );
        let changed = self.conn.execute(
            &sql,
            params![
                row.batch_id,
                row.date.format(AUDIT_DATE_FORMAT).to_string(),
                row.time.format(AUDIT_TIME_FORMAT).to_string(),
                row.record_count as i64,
            ],
        )?;
        Ok(changed == 1)
    }
}
