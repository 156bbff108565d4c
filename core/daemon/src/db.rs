//! SQLite persistence for stint-daemon.
//!
//! This is the single-writer run ledger backing the daemon. The schema is
//! intentionally small: a singleton `open_stint` row marking the run in
//! progress and an append-only `stints` history. The open row is the
//! crash-recovery source of truth; finishing a run appends to history and
//! clears the open row in one transaction.

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::PathBuf;

use stint_core::{parse_rfc3339, OpenStint, StintRecord};

pub struct Db {
    path: PathBuf,
}

impl Db {
    pub fn new(path: PathBuf) -> Result<Self, String> {
        let db = Self { path };
        db.init_schema()?;
        Ok(db)
    }

    /// Arm the open-stint row.
    ///
    /// The fixed key makes "at most one open run" a schema-level guarantee;
    /// re-arming overwrites whatever row was there.
    pub fn begin_stint(&self, open: &OpenStint) -> Result<(), String> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO open_stint (id, started_at, tag) \
                 VALUES (0, ?1, ?2) \
                 ON CONFLICT(id) DO UPDATE SET \
                    started_at = excluded.started_at, \
                    tag = excluded.tag",
                params![open.started_at.to_rfc3339(), open.tag],
            )
            .map_err(|err| format!("Failed to arm open stint: {}", err))?;
            Ok(())
        })
    }

    /// Append the completed record and clear the open row as one atomic
    /// unit, so a resume racing a stop observes either the old row or its
    /// absence, never a half-written state.
    pub fn finish_stint(&self, record: &StintRecord) -> Result<(), String> {
        self.with_connection(|conn| {
            let tx = conn
                .transaction()
                .map_err(|err| format!("Failed to start finish transaction: {}", err))?;
            tx.execute(
                "INSERT INTO stints (started_at, ended_at, duration_secs, tag) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.started_at.to_rfc3339(),
                    record.ended_at.to_rfc3339(),
                    record.duration_secs,
                    record.tag
                ],
            )
            .map_err(|err| format!("Failed to append stint record: {}", err))?;
            tx.execute("DELETE FROM open_stint", [])
                .map_err(|err| format!("Failed to clear open stint: {}", err))?;
            tx.commit()
                .map_err(|err| format!("Failed to commit finish transaction: {}", err))?;
            Ok(())
        })
    }

    /// Read the open row without deleting it. Returns `None` when no run
    /// was in progress; a malformed row is an error so the caller can log
    /// it and skip recovery instead of crashing.
    pub fn open_stint(&self) -> Result<Option<OpenStint>, String> {
        self.with_connection(|conn| {
            let row: Option<(String, String)> = conn
                .query_row(
                    "SELECT started_at, tag FROM open_stint WHERE id = 0",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(|err| format!("Failed to query open stint: {}", err))?;

            match row {
                Some((started_at, tag)) => OpenStint::from_columns(&started_at, &tag)
                    .map(Some)
                    .map_err(|err| format!("Failed to parse open stint row: {}", err)),
                None => Ok(None),
            }
        })
    }

    /// Distinct tags with at least one completed stint. The open row never
    /// contributes a tag, so bookkeeping state cannot leak into this list.
    pub fn list_tags(&self) -> Result<Vec<String>, String> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare("SELECT DISTINCT tag FROM stints ORDER BY tag ASC")
                .map_err(|err| format!("Failed to prepare tags query: {}", err))?;

            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|err| format!("Failed to read tag rows: {}", err))?;

            let mut tags = Vec::new();
            for row in rows {
                tags.push(row.map_err(|err| format!("Failed to decode tag row: {}", err))?);
            }
            Ok(tags)
        })
    }

    /// Completed stints, newest first, optionally filtered by tag.
    pub fn list_stints(
        &self,
        tag: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StintRecord>, String> {
        self.with_connection(|conn| {
            let limit = limit as i64;
            let (sql, params): (&str, Vec<&dyn rusqlite::types::ToSql>) = match &tag {
                Some(tag) => (
                    "SELECT started_at, ended_at, duration_secs, tag FROM stints \
                     WHERE tag = ?1 \
                     ORDER BY started_at DESC, id DESC LIMIT ?2",
                    vec![tag as &dyn rusqlite::types::ToSql, &limit],
                ),
                None => (
                    "SELECT started_at, ended_at, duration_secs, tag FROM stints \
                     ORDER BY started_at DESC, id DESC LIMIT ?1",
                    vec![&limit],
                ),
            };

            let mut stmt = conn
                .prepare(sql)
                .map_err(|err| format!("Failed to prepare stints query: {}", err))?;

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    let started_at: String = row.get(0)?;
                    let ended_at: String = row.get(1)?;
                    Ok(StintRecord {
                        started_at: parse_stored_timestamp(started_at)?,
                        ended_at: parse_stored_timestamp(ended_at)?,
                        duration_secs: row.get(2)?,
                        tag: row.get(3)?,
                    })
                })
                .map_err(|err| format!("Failed to read stint rows: {}", err))?;

            let mut stints = Vec::new();
            for row in rows {
                stints.push(row.map_err(|err| format!("Failed to decode stint row: {}", err))?);
            }
            Ok(stints)
        })
    }

    fn init_schema(&self) -> Result<(), String> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "BEGIN;
                 CREATE TABLE IF NOT EXISTS open_stint (
                    id INTEGER PRIMARY KEY CHECK (id = 0),
                    started_at TEXT NOT NULL,
                    tag TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS stints (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    started_at TEXT NOT NULL,
                    ended_at TEXT NOT NULL,
                    duration_secs INTEGER NOT NULL,
                    tag TEXT NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS stints_tag ON stints (tag);
                 COMMIT;",
            )
            .map_err(|err| format!("Failed to initialize schema: {}", err))?;
            Ok(())
        })
    }

    pub(crate) fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> Result<T, String>,
    ) -> Result<T, String> {
        let mut conn = self.open()?;
        op(&mut conn)
    }

    fn open(&self) -> Result<Connection, String> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| format!("Failed to create daemon data dir: {}", err))?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let conn = Connection::open_with_flags(&self.path, flags)
            .map_err(|err| format!("Failed to open sqlite db: {}", err))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|err| format!("Failed to enable WAL: {}", err))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|err| format!("Failed to set synchronous: {}", err))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|err| format!("Failed to set busy_timeout: {}", err))?;

        Ok(conn)
    }
}

fn parse_stored_timestamp(value: String) -> Result<chrono::DateTime<chrono::Utc>, rusqlite::Error> {
    parse_rfc3339(&value).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            value.len(),
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Bad stored timestamp: {}", value),
            )),
        )
    })
}
