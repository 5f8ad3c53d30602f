use rusqlite::{params, OptionalExtension};

use super::sqlite::{now_ts, Storage};
use crate::error::Result;
use crate::models::settings::ConfigKind;

impl Storage {
    pub fn load_setting(&self, kind: ConfigKind) -> Result<Option<String>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT value_json FROM settings WHERE kind = ?1",
                    params![kind.as_str()],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    /// Replaces the whole document stored under `kind`.
    pub fn store_setting(&self, kind: ConfigKind, value_json: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO settings (kind, value_json, updated_at) VALUES (?1, ?2, ?3)
                ON CONFLICT(kind) DO UPDATE SET
                    value_json = excluded.value_json,
                    updated_at = excluded.updated_at
                "#,
                params![kind.as_str(), value_json, now_ts()],
            )?;
            Ok(())
        })
    }
}
