//! SQLite-backed pre-match store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::path::{longest_prefix_match, normalize_path};
use super::{PreMatch, PreMatchError, PreMatchStore};
use crate::platform::MediaId;

const COLUMNS: &str = "id, destination, media_id, created_at, updated_at";

/// SQLite-backed pre-match store.
pub struct SqlitePreMatchStore {
    conn: Mutex<Connection>,
}

impl SqlitePreMatchStore {
    /// Open (or create) the database file and its table.
    pub fn new(path: &Path) -> Result<Self, PreMatchError> {
        let conn = Connection::open(path).map_err(|e| PreMatchError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, PreMatchError> {
        let conn =
            Connection::open_in_memory().map_err(|e| PreMatchError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), PreMatchError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS torrent_prematch (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                destination TEXT NOT NULL UNIQUE,
                media_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_torrent_prematch_created ON torrent_prematch(created_at);
            "#,
        )
        .map_err(|e| PreMatchError::Database(e.to_string()))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, PreMatchError> {
        self.conn
            .lock()
            .map_err(|_| PreMatchError::Database("connection lock poisoned".to_string()))
    }

    fn row_to_prematch(row: &rusqlite::Row) -> rusqlite::Result<PreMatch> {
        let created_at_str: String = row.get(3)?;
        let updated_at_str: String = row.get(4)?;

        Ok(PreMatch {
            id: row.get(0)?,
            destination: row.get(1)?,
            media_id: row.get(2)?,
            created_at: parse_timestamp(&created_at_str),
            updated_at: parse_timestamp(&updated_at_str),
        })
    }

    pub(crate) fn save_at(
        &self,
        destination: &str,
        media_id: MediaId,
        now: DateTime<Utc>,
    ) -> Result<PreMatch, PreMatchError> {
        let destination = normalize_path(destination);
        if destination.is_empty() {
            return Err(PreMatchError::Database(
                "destination must not be empty".to_string(),
            ));
        }

        let conn = self.conn()?;
        let entry = conn
            .query_row(
                &format!(
                    "INSERT INTO torrent_prematch (destination, media_id, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?3)
                     ON CONFLICT(destination) DO UPDATE SET
                         media_id = excluded.media_id,
                         updated_at = excluded.updated_at
                     RETURNING {}",
                    COLUMNS
                ),
                params![destination, media_id, format_timestamp(now)],
                Self::row_to_prematch,
            )
            .map_err(|e| PreMatchError::Database(e.to_string()))?;

        debug!(destination = %entry.destination, media_id, "Saved pre-match");
        Ok(entry)
    }

    pub(crate) fn delete_older_than_at(
        &self,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<usize, PreMatchError> {
        // A window reaching past the earliest representable time keeps everything.
        let Some(cutoff) = Duration::try_days(i64::from(days))
            .and_then(|window| now.checked_sub_signed(window))
        else {
            debug!(days, "Pre-match age window out of range, nothing to prune");
            return Ok(0);
        };
        let cutoff = format_timestamp(cutoff);
        let conn = self.conn()?;
        let deleted = conn
            .execute(
                "DELETE FROM torrent_prematch WHERE created_at < ?",
                params![cutoff],
            )
            .map_err(|e| PreMatchError::Database(e.to_string()))?;

        if deleted > 0 {
            info!(deleted, days, "Pruned old pre-matches");
        }
        Ok(deleted)
    }
}

/// Fixed-width UTC timestamps so that string order equals time order.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl PreMatchStore for SqlitePreMatchStore {
    fn save(&self, destination: &str, media_id: MediaId) -> Result<PreMatch, PreMatchError> {
        self.save_at(destination, media_id, Utc::now())
    }

    fn get(&self, id: i64) -> Result<PreMatch, PreMatchError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM torrent_prematch WHERE id = ?", COLUMNS),
            params![id],
            Self::row_to_prematch,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => PreMatchError::NotFound(id.to_string()),
            _ => PreMatchError::Database(e.to_string()),
        })
    }

    fn get_by_destination(&self, destination: &str) -> Result<Option<PreMatch>, PreMatchError> {
        let destination = normalize_path(destination);
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM torrent_prematch WHERE destination = ?", COLUMNS),
            params![destination],
            Self::row_to_prematch,
        )
        .optional()
        .map_err(|e| PreMatchError::Database(e.to_string()))
    }

    fn get_for_path(&self, file_path: &str) -> Result<Option<MediaId>, PreMatchError> {
        let path = normalize_path(file_path);
        let entries = self.get_all()?;

        Ok(longest_prefix_match(
            &path,
            entries.iter().map(|e| (e.destination.as_str(), e.media_id)),
        ))
    }

    fn get_all(&self) -> Result<Vec<PreMatch>, PreMatchError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM torrent_prematch ORDER BY created_at ASC, id ASC",
                COLUMNS
            ))
            .map_err(|e| PreMatchError::Database(e.to_string()))?;

        let rows = stmt
            .query_map([], Self::row_to_prematch)
            .map_err(|e| PreMatchError::Database(e.to_string()))?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(|e| PreMatchError::Database(e.to_string()))?);
        }
        Ok(entries)
    }

    fn delete_by_id(&self, id: i64) -> Result<(), PreMatchError> {
        let conn = self.conn()?;
        let deleted = conn
            .execute("DELETE FROM torrent_prematch WHERE id = ?", params![id])
            .map_err(|e| PreMatchError::Database(e.to_string()))?;

        if deleted == 0 {
            return Err(PreMatchError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn delete_by_destination(&self, destination: &str) -> Result<bool, PreMatchError> {
        let destination = normalize_path(destination);
        let conn = self.conn()?;
        let deleted = conn
            .execute(
                "DELETE FROM torrent_prematch WHERE destination = ?",
                params![destination],
            )
            .map_err(|e| PreMatchError::Database(e.to_string()))?;

        Ok(deleted > 0)
    }

    fn delete_older_than(&self, days: u32) -> Result<usize, PreMatchError> {
        self.delete_older_than_at(days, Utc::now())
    }

    fn clear_all(&self) -> Result<usize, PreMatchError> {
        let conn = self.conn()?;
        let deleted = conn
            .execute("DELETE FROM torrent_prematch", [])
            .map_err(|e| PreMatchError::Database(e.to_string()))?;

        info!(deleted, "Cleared all pre-matches");
        Ok(deleted)
    }
}
