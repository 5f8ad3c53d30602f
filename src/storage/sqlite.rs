use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};

/// SQLite-backed store shared by every pipeline stage.
pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_db()?;
        Ok(storage)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_db()?;
        Ok(storage)
    }

    fn init_db(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch(
                r#"
                PRAGMA foreign_keys = ON;

                CREATE TABLE IF NOT EXISTS repo_record (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    full_name TEXT UNIQUE NOT NULL,
                    url TEXT NOT NULL,
                    description TEXT,
                    language TEXT,
                    stars INTEGER NOT NULL DEFAULT 0,
                    forks INTEGER NOT NULL DEFAULT 0,
                    pull_time TEXT NOT NULL,
                    rule TEXT,
                    pull_task_id TEXT,
                    status TEXT NOT NULL,
                    summary TEXT,
                    detail TEXT,
                    readme_path TEXT
                );

                CREATE TABLE IF NOT EXISTS settings (
                    kind TEXT PRIMARY KEY,
                    value_json TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS analysis_result (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    repo_full_name TEXT NOT NULL,
                    findings_json TEXT NOT NULL,
                    provider TEXT NOT NULL,
                    model TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS make_task (
                    task_id TEXT PRIMARY KEY,
                    repo_name TEXT,
                    analysis_id INTEGER,
                    pull_record_id INTEGER,
                    prompt_id INTEGER,
                    parent_task_id TEXT,
                    suggestions TEXT,
                    seed_content TEXT,
                    status TEXT NOT NULL,
                    review TEXT NOT NULL DEFAULT 'unreviewed',
                    content TEXT,
                    error TEXT,
                    idempotency_key TEXT UNIQUE,
                    created_at TEXT NOT NULL,
                    started_at TEXT,
                    finished_at TEXT
                );

                CREATE TABLE IF NOT EXISTS task_log (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    task_id TEXT NOT NULL REFERENCES make_task(task_id),
                    line TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS review_decision (
                    task_id TEXT PRIMARY KEY REFERENCES make_task(task_id),
                    verdict TEXT NOT NULL,
                    notes TEXT,
                    decided_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS publish_record (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    article_id TEXT NOT NULL REFERENCES make_task(task_id),
                    title TEXT NOT NULL,
                    target TEXT NOT NULL,
                    status TEXT NOT NULL,
                    link TEXT,
                    message TEXT,
                    published_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS prompt_config (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    scene TEXT NOT NULL,
                    name TEXT NOT NULL,
                    content TEXT NOT NULL,
                    is_default INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_repo_record_pull_time ON repo_record(pull_time);
                CREATE INDEX IF NOT EXISTS idx_make_task_status ON make_task(status);
                CREATE INDEX IF NOT EXISTS idx_make_task_record ON make_task(pull_record_id);
                CREATE INDEX IF NOT EXISTS idx_task_log_task ON task_log(task_id);
                CREATE INDEX IF NOT EXISTS idx_publish_record_article ON publish_record(article_id);
                CREATE UNIQUE INDEX IF NOT EXISTS idx_prompt_one_default
                    ON prompt_config(scene) WHERE is_default = 1;
                "#,
            )?;
            Ok(())
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::StoragePoisoned)
    }

    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Runs `f` in one transaction; any error rolls everything back.
    pub(crate) fn with_tx<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

/// Fixed-width timestamps so text ordering matches time ordering.
pub(crate) fn ts(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn now_ts() -> String {
    ts(&Utc::now())
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub(crate) fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

pub(crate) fn opt_time_column(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

pub(crate) fn enum_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = Error>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

pub(crate) fn json_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}
