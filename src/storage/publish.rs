use rusqlite::{params, Row};

use super::sqlite::{enum_column, now_ts, time_column, Storage};
use crate::error::{Error, Result};
use crate::models::publish::{PublishLink, PublishRecord, TargetOutcome};

fn publish_from_row(row: &Row<'_>) -> rusqlite::Result<PublishRecord> {
    Ok(PublishRecord {
        id: row.get(0)?,
        article_id: row.get(1)?,
        title: row.get(2)?,
        target: row.get(3)?,
        status: enum_column(row, 4)?,
        link: row.get(5)?,
        message: row.get(6)?,
        published_at: time_column(row, 7)?,
    })
}

impl Storage {
    /// Appends one publish attempt.
    pub fn insert_publish(
        &self,
        article_id: &str,
        title: &str,
        outcome: &TargetOutcome,
    ) -> Result<PublishRecord> {
        self.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO publish_record (article_id, title, target, status, link, message, published_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    article_id,
                    title,
                    outcome.target,
                    outcome.status.as_str(),
                    outcome.link,
                    outcome.message,
                    now_ts(),
                ],
            )?;
            let id = conn.last_insert_rowid();
            conn.query_row(
                "SELECT id, article_id, title, target, status, link, message, published_at \
                 FROM publish_record WHERE id = ?1",
                params![id],
                publish_from_row,
            )
            .map_err(Error::from)
        })
    }

    /// Every publish attempt, newest first.
    pub fn publish_history(&self) -> Result<Vec<PublishRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, article_id, title, target, status, link, message, published_at \
                 FROM publish_record ORDER BY published_at DESC, id DESC",
            )?;
            let records = stmt
                .query_map([], publish_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
    }

    pub fn publish_links(&self) -> Result<Vec<PublishLink>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT article_id, title, target, link, published_at FROM publish_record \
                 WHERE status = 'published' AND link IS NOT NULL \
                 ORDER BY published_at DESC, id DESC",
            )?;
            let links = stmt
                .query_map([], |row| {
                    Ok(PublishLink {
                        article_id: row.get(0)?,
                        title: row.get(1)?,
                        target: row.get(2)?,
                        link: row.get(3)?,
                        published_at: time_column(row, 4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(links)
        })
    }
}
