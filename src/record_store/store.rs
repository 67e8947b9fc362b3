//! SQLite-backed record storage with content-hash change tracking.

use super::hash::content_hash;
use super::models::*;
use super::schema::RECORDS_VERSIONED_SCHEMAS;
use super::trait_def::RecordStore;
use crate::normalizer::CanonicalRecord;
use crate::sqlite_persistence::{migrate_if_needed, read_schema_version};
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

const DB_LABEL: &str = "records";

const RECORD_COLUMNS: &str = "item_id, title, description, subjects, contributors, \
     date_created, location, block_number, raw_metadata, content_hash, first_seen, \
     last_updated, last_checked, images_downloaded, page_count";

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Returns the current time as Unix milliseconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp_millis())
}

pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
    clock: Clock,
}

impl SqliteRecordStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let mut conn = if db_path.as_ref().exists() {
            Connection::open_with_flags(
                &db_path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                    | rusqlite::OpenFlags::SQLITE_OPEN_URI
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?
        } else {
            let conn = Connection::open(&db_path)?;
            RECORDS_VERSIONED_SCHEMAS
                .last()
                .context("No schemas defined")?
                .create(&conn)?;
            info!("Created new records database at {:?}", db_path.as_ref());
            conn
        };

        let version = read_schema_version(&conn, RECORDS_VERSIONED_SCHEMAS, DB_LABEL)?;
        RECORDS_VERSIONED_SCHEMAS
            .get(version)
            .context("Failed to get schema")?
            .validate(&conn)?;
        migrate_if_needed(&mut conn, RECORDS_VERSIONED_SCHEMAS, version, DB_LABEL)?;

        Ok(SqliteRecordStore {
            conn: Arc::new(Mutex::new(conn)),
            clock: system_clock(),
        })
    }

    /// Create an in-memory store for testing.
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        RECORDS_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;

        Ok(SqliteRecordStore {
            conn: Arc::new(Mutex::new(conn)),
            clock: system_clock(),
        })
    }

    /// Replaces the wall clock, used by tests to control timestamps.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> i64 {
        (self.clock)()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("records database lock poisoned"))
    }

    fn row_to_record(row: &Row) -> rusqlite::Result<StoredRecord> {
        Ok(StoredRecord {
            item_id: row.get("item_id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            subjects: json_column(row, "subjects")?,
            contributors: json_column(row, "contributors")?,
            date: row.get("date_created")?,
            location: row.get("location")?,
            block_number: row.get("block_number")?,
            raw: json_column(row, "raw_metadata")?,
            content_hash: row.get("content_hash")?,
            first_seen: row.get("first_seen")?,
            last_updated: row.get("last_updated")?,
            last_checked: row.get("last_checked")?,
            images_downloaded: row.get::<_, i64>("images_downloaded")? != 0,
            page_count: row.get("page_count")?,
        })
    }

    fn query_records(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<StoredRecord>> {
        let mut stmt = conn.prepare(sql)?;
        let records = stmt
            .query_map(params, Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn count_where(conn: &Connection, condition: &str, value: i64) -> Result<usize> {
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM records WHERE {}", condition),
            params![value],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

fn json_column<T: DeserializeOwned>(row: &Row, name: &str) -> rusqlite::Result<T> {
    let text: String = row.get(name)?;
    serde_json::from_str(&text).map_err(|e| {
        let index = row.as_ref().column_index(name).unwrap_or_default();
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e))
    })
}

fn limit_param(limit: Option<usize>) -> i64 {
    limit.map(|l| l as i64).unwrap_or(-1)
}

/// Escapes LIKE wildcards so user text matches literally.
fn like_pattern(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

impl RecordStore for SqliteRecordStore {
    fn upsert(&self, item_id: &str, record: &CanonicalRecord) -> Result<UpsertOutcome> {
        let hash = content_hash(record);
        let now = self.now();
        let subjects = serde_json::to_string(&record.subjects)?;
        let contributors = serde_json::to_string(&record.contributors)?;
        let raw = serde_json::to_string(&record.raw)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let existing_hash: Option<String> = tx
            .query_row(
                "SELECT content_hash FROM records WHERE item_id = ?1",
                params![item_id],
                |row| row.get(0),
            )
            .optional()?;

        let outcome = match existing_hash {
            None => {
                tx.execute(
                    "INSERT INTO records (item_id, title, description, subjects, contributors,
                        date_created, location, block_number, raw_metadata, content_hash,
                        first_seen, last_updated, last_checked, images_downloaded)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11, ?11, 0)",
                    params![
                        item_id,
                        record.title,
                        record.description,
                        subjects,
                        contributors,
                        record.date,
                        record.location,
                        record.block_number,
                        raw,
                        hash,
                        now,
                    ],
                )?;
                UpsertOutcome::New
            }
            Some(stored_hash) if stored_hash != hash => {
                tx.execute(
                    "UPDATE records SET title = ?2, description = ?3, subjects = ?4,
                        contributors = ?5, date_created = ?6, location = ?7, block_number = ?8,
                        raw_metadata = ?9, content_hash = ?10, last_updated = ?11,
                        last_checked = ?11, images_downloaded = 0
                     WHERE item_id = ?1",
                    params![
                        item_id,
                        record.title,
                        record.description,
                        subjects,
                        contributors,
                        record.date,
                        record.location,
                        record.block_number,
                        raw,
                        hash,
                        now,
                    ],
                )?;
                UpsertOutcome::Changed
            }
            Some(_) => {
                tx.execute(
                    "UPDATE records SET last_checked = ?2 WHERE item_id = ?1",
                    params![item_id, now],
                )?;
                UpsertOutcome::Unchanged
            }
        };

        tx.commit()
            .with_context(|| format!("Failed to commit upsert of {}", item_id))?;
        debug!("Upserted {}: {}", item_id, outcome.as_str());
        Ok(outcome)
    }

    fn stale_records(&self, older_than: Duration, limit: Option<usize>) -> Result<Vec<String>> {
        let threshold = self.now() - older_than.as_millis() as i64;
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT item_id FROM records WHERE last_checked < ?1
             ORDER BY last_checked ASC, item_id ASC LIMIT ?2",
        )?;
        let ids = stmt
            .query_map(params![threshold, limit_param(limit)], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    fn mark_images_downloaded(&self, item_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE records SET images_downloaded = 1 WHERE item_id = ?1",
            params![item_id],
        )?;
        Ok(updated > 0)
    }

    fn records_without_images(&self, limit: Option<usize>) -> Result<Vec<StoredRecord>> {
        let conn = self.lock()?;
        Self::query_records(
            &conn,
            &format!(
                "SELECT {} FROM records WHERE images_downloaded = 0 ORDER BY item_id LIMIT ?1",
                RECORD_COLUMNS
            ),
            params![limit_param(limit)],
        )
    }

    fn set_page_count(&self, item_id: &str, page_count: usize) -> Result<bool> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE records SET page_count = ?2 WHERE item_id = ?1",
            params![item_id, page_count as i64],
        )?;
        Ok(updated > 0)
    }

    fn get_by_id(&self, item_id: &str) -> Result<Option<StoredRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                &format!("SELECT {} FROM records WHERE item_id = ?1", RECORD_COLUMNS),
                params![item_id],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn count_all(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn list(&self, query: &RecordQuery) -> Result<Vec<StoredRecord>> {
        let conn = self.lock()?;
        // Sort column and direction come from enums, never from caller text
        let sql = format!(
            "SELECT {} FROM records ORDER BY {} {}, item_id ASC LIMIT ?1 OFFSET ?2",
            RECORD_COLUMNS,
            query.sort_by.column(),
            query.order.as_sql()
        );
        Self::query_records(
            &conn,
            &sql,
            params![query.limit() as i64, query.offset() as i64],
        )
    }

    fn search(&self, text: &str, page: usize, page_size: usize) -> Result<Vec<StoredRecord>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let paging = RecordQuery {
            page,
            page_size,
            ..RecordQuery::default()
        };
        let conn = self.lock()?;
        let sql = format!(
            r"SELECT {} FROM records
             WHERE title LIKE ?1 ESCAPE '\'
                OR description LIKE ?1 ESCAPE '\'
                OR subjects LIKE ?1 ESCAPE '\'
                OR contributors LIKE ?1 ESCAPE '\'
                OR CAST(block_number AS TEXT) LIKE ?1 ESCAPE '\'
             ORDER BY item_id ASC LIMIT ?2 OFFSET ?3",
            RECORD_COLUMNS
        );
        Self::query_records(
            &conn,
            &sql,
            params![
                like_pattern(text),
                paging.limit() as i64,
                paging.offset() as i64
            ],
        )
    }

    fn stats(&self) -> Result<StoreStats> {
        let now = self.now();
        let conn = self.lock()?;

        let total_records: i64 =
            conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        let with_images = Self::count_where(&conn, "images_downloaded = ?1", 1)?;
        let updated_last_7_days = Self::count_where(&conn, "last_updated >= ?1", now - 7 * DAY_MS)?;
        let new_last_30_days = Self::count_where(&conn, "first_seen >= ?1", now - 30 * DAY_MS)?;
        let last_updated: Option<i64> =
            conn.query_row("SELECT MAX(last_updated) FROM records", [], |row| row.get(0))?;

        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
        let quick_check: String = conn.query_row("PRAGMA quick_check", [], |row| row.get(0))?;

        let total_records = total_records as usize;
        Ok(StoreStats {
            total_records,
            with_images,
            without_images: total_records.saturating_sub(with_images),
            updated_last_7_days,
            new_last_30_days,
            last_updated,
            database_size_bytes: (page_count.max(0) * page_size.max(0)) as u64,
            healthy: quick_check == "ok",
        })
    }
}
