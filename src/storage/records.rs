use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;

use super::sqlite::{enum_column, now_ts, opt_time_column, time_column, Storage};
use crate::error::Result;
use crate::models::repo::{
    DiscoveredRepo, Page, RecordQuery, RecordStatus, RecordView, RepoRecord, RepoStats,
};

const RECORD_COLUMNS: &str = "id, full_name, url, description, language, stars, forks, \
     pull_time, rule, pull_task_id, status, summary, detail, readme_path";

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<RepoRecord> {
    Ok(RepoRecord {
        id: row.get(0)?,
        full_name: row.get(1)?,
        url: row.get(2)?,
        description: row.get(3)?,
        language: row.get(4)?,
        stars: row.get(5)?,
        forks: row.get(6)?,
        pull_time: time_column(row, 7)?,
        rule: row.get(8)?,
        pull_task_id: row.get(9)?,
        status: enum_column(row, 10)?,
        summary: row.get(11)?,
        detail: row.get(12)?,
        readme_path: row.get(13)?,
    })
}

fn record_by_name(conn: &Connection, full_name: &str) -> Result<Option<RepoRecord>> {
    let sql = format!("SELECT {} FROM repo_record WHERE full_name = ?1", RECORD_COLUMNS);
    Ok(conn
        .query_row(&sql, params![full_name], record_from_row)
        .optional()?)
}

/// Escapes `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
fn like_pattern(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len() + 2);
    escaped.push('%');
    for c in keyword.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

impl Storage {
    /// Inserts a discovered repository or refreshes the row with the same full name.
    pub fn upsert_record(
        &self,
        repo: &DiscoveredRepo,
        rule: Option<&str>,
        pull_task_id: Option<&str>,
        status: RecordStatus,
    ) -> Result<RepoRecord> {
        self.with_tx(|conn| {
            conn.execute(
                r#"
                INSERT INTO repo_record (full_name, url, description, language, stars, forks,
                                         pull_time, rule, pull_task_id, status)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(full_name) DO UPDATE SET
                    url = excluded.url,
                    description = excluded.description,
                    language = excluded.language,
                    stars = excluded.stars,
                    forks = excluded.forks,
                    pull_time = excluded.pull_time,
                    rule = COALESCE(excluded.rule, repo_record.rule),
                    pull_task_id = COALESCE(excluded.pull_task_id, repo_record.pull_task_id),
                    status = excluded.status
                "#,
                params![
                    repo.full_name,
                    repo.url,
                    repo.description,
                    repo.language,
                    repo.stars,
                    repo.forks,
                    now_ts(),
                    rule,
                    pull_task_id,
                    status.as_str(),
                ],
            )?;
            record_by_name(conn, &repo.full_name)?.ok_or_else(|| {
                crate::error::Error::NotFound(format!("record {}", repo.full_name))
            })
        })
    }

    pub fn get_record(&self, id: i64) -> Result<Option<RepoRecord>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM repo_record WHERE id = ?1", RECORD_COLUMNS);
            Ok(conn.query_row(&sql, params![id], record_from_row).optional()?)
        })
    }

    pub fn get_record_by_name(&self, full_name: &str) -> Result<Option<RepoRecord>> {
        self.with_conn(|conn| record_by_name(conn, full_name))
    }

    /// Page of records, newest pull first, each joined with its newest generation task.
    pub fn list_records(&self, query: &RecordQuery) -> Result<Page<RecordView>> {
        let pattern = query.keyword().map(like_pattern);
        let filter = if pattern.is_some() {
            "WHERE lower(r.full_name) LIKE ?1 ESCAPE '\\' \
             OR lower(COALESCE(r.summary, '')) LIKE ?1 ESCAPE '\\'"
        } else {
            "WHERE ?1 IS NULL"
        };

        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM repo_record r {}", filter),
                params![pattern],
                |row| row.get(0),
            )?;

            let columns = RECORD_COLUMNS
                .split(", ")
                .map(|c| format!("r.{}", c.trim()))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                r#"
                SELECT {columns},
                       (SELECT t.task_id FROM make_task t
                         WHERE t.pull_record_id = r.id OR t.repo_name = r.full_name
                         ORDER BY t.created_at DESC, t.rowid DESC LIMIT 1),
                       (SELECT t.status FROM make_task t
                         WHERE t.pull_record_id = r.id OR t.repo_name = r.full_name
                         ORDER BY t.created_at DESC, t.rowid DESC LIMIT 1)
                FROM repo_record r
                {filter}
                ORDER BY r.pull_time DESC, r.id DESC
                LIMIT ?2 OFFSET ?3
                "#,
            );
            let mut stmt = conn.prepare(&sql)?;
            let items = stmt
                .query_map(
                    params![pattern, query.page_size(), query.offset() as i64],
                    |row| {
                        let status: Option<String> = row.get(15)?;
                        let task_status = match status {
                            Some(_) => Some(enum_column(row, 15)?),
                            None => None,
                        };
                        Ok(RecordView {
                            record: record_from_row(row)?,
                            task_id: row.get(14)?,
                            task_status,
                        })
                    },
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(Page {
                items,
                total: total as u64,
                page: query.page(),
                page_size: query.page_size(),
            })
        })
    }

    /// Most starred records, for the repository overview.
    pub fn top_records(&self, limit: u32) -> Result<Vec<RepoRecord>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM repo_record ORDER BY stars DESC, id ASC LIMIT ?1",
                RECORD_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let records = stmt
                .query_map(params![limit], record_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
    }

    /// Every record with the given status, oldest first.
    pub fn records_with_status(&self, status: RecordStatus) -> Result<Vec<RepoRecord>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM repo_record WHERE status = ?1 ORDER BY id ASC",
                RECORD_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let records = stmt
                .query_map(params![status.as_str()], record_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
    }

    /// Fetched records that no generation task refers to, by id or by name.
    pub fn fetched_without_task(&self) -> Result<Vec<RepoRecord>> {
        self.with_conn(|conn| {
            let sql = format!(
                r#"
                SELECT {} FROM repo_record r
                WHERE r.status = 'fetched' AND NOT EXISTS (
                    SELECT 1 FROM make_task t
                    WHERE t.pull_record_id = r.id OR t.repo_name = r.full_name)
                ORDER BY r.id ASC
                "#,
                RECORD_COLUMNS
                    .split(", ")
                    .map(|c| format!("r.{}", c.trim()))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            let mut stmt = conn.prepare(&sql)?;
            let records = stmt
                .query_map([], record_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
    }

    pub fn repo_stats(&self) -> Result<RepoStats> {
        self.with_conn(|conn| {
            let (total_repos, total_stars, total_forks): (i64, i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(stars), 0), COALESCE(SUM(forks), 0) FROM repo_record",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
            let last_pull = conn.query_row(
                "SELECT MAX(pull_time) FROM repo_record",
                [],
                |row| opt_time_column(row, 0),
            )?;

            let mut stmt = conn.prepare(
                "SELECT COALESCE(language, 'Unknown'), COUNT(*) FROM repo_record GROUP BY 1",
            )?;
            let language_distribution = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
                })?
                .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;

            Ok(RepoStats {
                total_repos: total_repos as u64,
                total_stars: total_stars as u64,
                total_forks: total_forks as u64,
                language_distribution,
                last_pull,
            })
        })
    }

    pub fn update_record_ingest(
        &self,
        id: i64,
        status: RecordStatus,
        summary: Option<&str>,
        detail: Option<&str>,
        readme_path: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                r#"
                UPDATE repo_record SET
                    status = ?2,
                    summary = COALESCE(?3, summary),
                    detail = COALESCE(?4, detail),
                    readme_path = COALESCE(?5, readme_path)
                WHERE id = ?1
                "#,
                params![id, status.as_str(), summary, detail, readme_path],
            )?;
            Ok(())
        })
    }

    /// Removes records sharing a URL, keeping the newest row. Returns the number removed.
    pub fn deduplicate_records(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                r#"
                DELETE FROM repo_record
                WHERE id NOT IN (SELECT MAX(id) FROM repo_record GROUP BY lower(url))
                "#,
                [],
            )?;
            Ok(removed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(full_name: &str, stars: u32, language: Option<&str>) -> DiscoveredRepo {
        DiscoveredRepo {
            full_name: full_name.to_string(),
            url: format!("https://github.com/{}", full_name),
            description: Some(format!("{} description", full_name)),
            language: language.map(str::to_string),
            stars,
            forks: stars / 10,
        }
    }

    #[test]
    fn test_upsert_keeps_one_row_per_full_name() {
        let storage = Storage::in_memory().unwrap();
        let first = storage
            .upsert_record(&repo("a/one", 10, Some("Rust")), Some("stars"), None, RecordStatus::Pending)
            .unwrap();
        let second = storage
            .upsert_record(&repo("a/one", 25, Some("Rust")), None, None, RecordStatus::Pending)
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.stars, 25);
        assert_eq!(second.rule.as_deref(), Some("stars"));
        assert_eq!(storage.repo_stats().unwrap().total_repos, 1);
    }

    #[test]
    fn test_list_records_filters_and_pages() {
        let storage = Storage::in_memory().unwrap();
        for i in 0..5 {
            storage
                .upsert_record(&repo(&format!("org/tool-{}", i), i, None), None, None, RecordStatus::Pending)
                .unwrap();
        }
        storage
            .upsert_record(&repo("other/thing_x", 1, None), None, None, RecordStatus::Pending)
            .unwrap();

        let page = storage
            .list_records(&RecordQuery {
                page: Some(1),
                page_size: Some(2),
                keyword: Some("TOOL".to_string()),
            })
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        assert!(page.items.iter().all(|v| v.task_id.is_none()));

        let underscore = storage
            .list_records(&RecordQuery {
                keyword: Some("_x".to_string()),
                ..RecordQuery::default()
            })
            .unwrap();
        assert_eq!(underscore.total, 1);

        let all = storage.list_records(&RecordQuery::default()).unwrap();
        assert_eq!(all.total, 6);
    }

    #[test]
    fn test_stats_and_top_records() {
        let storage = Storage::in_memory().unwrap();
        storage
            .upsert_record(&repo("a/rust", 100, Some("Rust")), None, None, RecordStatus::Pending)
            .unwrap();
        storage
            .upsert_record(&repo("b/go", 50, Some("Go")), None, None, RecordStatus::Pending)
            .unwrap();
        storage
            .upsert_record(&repo("c/none", 5, None), None, None, RecordStatus::Pending)
            .unwrap();

        let stats = storage.repo_stats().unwrap();
        assert_eq!(stats.total_stars, 155);
        assert_eq!(stats.total_forks, 15);
        assert_eq!(stats.language_distribution.get("Unknown"), Some(&1));
        assert!(stats.last_pull.is_some());

        let top = storage.top_records(2).unwrap();
        assert_eq!(top[0].full_name, "a/rust");
        assert_eq!(top.len(), 2);
    }

    #[test]
    fn test_ingest_update_keeps_existing_text() {
        let storage = Storage::in_memory().unwrap();
        let record = storage
            .upsert_record(&repo("a/one", 1, None), None, None, RecordStatus::Pending)
            .unwrap();
        storage
            .update_record_ingest(record.id, RecordStatus::Fetched, Some("short"), None, Some("data/x"))
            .unwrap();
        storage
            .update_record_ingest(record.id, RecordStatus::Fetched, None, Some("long"), None)
            .unwrap();

        let record = storage.get_record(record.id).unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Fetched);
        assert_eq!(record.summary.as_deref(), Some("short"));
        assert_eq!(record.detail.as_deref(), Some("long"));
        assert_eq!(record.readme_path.as_deref(), Some("data/x"));
    }

    #[test]
    fn test_fetched_records_without_task() {
        use crate::models::task::NewTask;

        let storage = Storage::in_memory().unwrap();
        let by_id = storage
            .upsert_record(&repo("a/by-id", 1, None), None, None, RecordStatus::Fetched)
            .unwrap();
        storage
            .upsert_record(&repo("a/by-name", 1, None), None, None, RecordStatus::Fetched)
            .unwrap();
        let free = storage
            .upsert_record(&repo("a/free", 1, None), None, None, RecordStatus::Fetched)
            .unwrap();
        storage
            .upsert_record(&repo("a/pending", 1, None), None, None, RecordStatus::Pending)
            .unwrap();
        storage
            .insert_task(&NewTask {
                pull_record_id: Some(by_id.id),
                repo_name: Some(by_id.full_name.clone()),
                ..NewTask::default()
            })
            .unwrap();
        storage
            .insert_task(&NewTask {
                repo_name: Some("a/by-name".to_string()),
                ..NewTask::default()
            })
            .unwrap();

        let open = storage.fetched_without_task().unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, free.id);
        assert_eq!(storage.records_with_status(RecordStatus::Fetched).unwrap().len(), 3);
        assert_eq!(storage.records_with_status(RecordStatus::Pending).unwrap().len(), 1);
    }
}
