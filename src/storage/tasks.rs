use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::sqlite::{enum_column, now_ts, opt_time_column, time_column, ts, Storage};
use crate::error::{Error, Result};
use crate::models::publish::PendingArticle;
use crate::models::review::{ReviewDecision, Verdict};
use crate::models::task::{new_task_id, ArticleTask, NewTask, ReviewState, TaskStatus};

const TASK_COLUMNS: &str = "task_id, repo_name, analysis_id, pull_record_id, prompt_id, \
     parent_task_id, suggestions, status, review, content, error, created_at, started_at, \
     finished_at";

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<ArticleTask> {
    Ok(ArticleTask {
        task_id: row.get(0)?,
        repo_name: row.get(1)?,
        analysis_id: row.get(2)?,
        pull_record_id: row.get(3)?,
        prompt_id: row.get(4)?,
        parent_task_id: row.get(5)?,
        suggestions: row.get(6)?,
        status: enum_column(row, 7)?,
        review: enum_column(row, 8)?,
        content: row.get(9)?,
        error: row.get(10)?,
        created_at: time_column(row, 11)?,
        started_at: opt_time_column(row, 12)?,
        finished_at: opt_time_column(row, 13)?,
    })
}

fn task_by_id(conn: &Connection, task_id: &str) -> Result<Option<ArticleTask>> {
    let sql = format!("SELECT {} FROM make_task WHERE task_id = ?1", TASK_COLUMNS);
    Ok(conn
        .query_row(&sql, params![task_id], task_from_row)
        .optional()?)
}

fn query_tasks(
    conn: &Connection,
    where_clause: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<ArticleTask>> {
    let sql = format!(
        "SELECT {} FROM make_task {} ORDER BY created_at DESC, rowid DESC",
        TASK_COLUMNS, where_clause
    );
    let mut stmt = conn.prepare(&sql)?;
    let tasks = stmt
        .query_map(params, task_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tasks)
}

fn insert_log(conn: &Connection, task_id: &str, line: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO task_log (task_id, line, created_at) VALUES (?1, ?2, ?3)",
        params![task_id, line, now_ts()],
    )?;
    Ok(())
}

impl Storage {
    /// Stores a new queued task. With an idempotency key that was already
    /// used, returns the existing task and `false` instead.
    pub fn insert_task(&self, new: &NewTask) -> Result<(ArticleTask, bool)> {
        self.with_tx(|conn| {
            if let Some(key) = &new.idempotency_key {
                let existing: Option<String> = conn
                    .query_row(
                        "SELECT task_id FROM make_task WHERE idempotency_key = ?1",
                        params![key],
                        |row| row.get(0),
                    )
                    .optional()?;
                if let Some(task_id) = existing {
                    let task = task_by_id(conn, &task_id)?
                        .ok_or_else(|| Error::NotFound(format!("task {}", task_id)))?;
                    return Ok((task, false));
                }
            }

            let task_id = new_task_id();
            conn.execute(
                r#"
                INSERT INTO make_task (task_id, repo_name, analysis_id, pull_record_id, prompt_id,
                                       parent_task_id, suggestions, seed_content, status, review,
                                       idempotency_key, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
                params![
                    task_id,
                    new.repo_name,
                    new.analysis_id,
                    new.pull_record_id,
                    new.prompt_id,
                    new.parent_task_id,
                    new.suggestions,
                    new.seed_content,
                    TaskStatus::Queued.as_str(),
                    ReviewState::Unreviewed.as_str(),
                    new.idempotency_key,
                    now_ts(),
                ],
            )?;
            insert_log(conn, &task_id, "task queued")?;

            let task = task_by_id(conn, &task_id)?
                .ok_or_else(|| Error::NotFound(format!("task {}", task_id)))?;
            Ok((task, true))
        })
    }

    pub fn get_task(&self, task_id: &str) -> Result<Option<ArticleTask>> {
        self.with_conn(|conn| task_by_id(conn, task_id))
    }

    /// Prior draft a regeneration task starts from.
    pub fn task_seed(&self, task_id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let seed: Option<Option<String>> = conn
                .query_row(
                    "SELECT seed_content FROM make_task WHERE task_id = ?1",
                    params![task_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(seed.flatten())
        })
    }

    pub fn list_tasks(&self) -> Result<Vec<ArticleTask>> {
        self.with_conn(|conn| query_tasks(conn, "", []))
    }

    /// Moves a task one step forward. The update only applies if the task is
    /// still in the expected prior state, so two workers can never both win.
    pub fn transition_task(
        &self,
        task_id: &str,
        to: TaskStatus,
        content: Option<&str>,
        error: Option<&str>,
    ) -> Result<ArticleTask> {
        let from = match to {
            TaskStatus::Running => TaskStatus::Queued,
            TaskStatus::Succeeded | TaskStatus::Failed => TaskStatus::Running,
            TaskStatus::Queued => {
                return Err(Error::Conflict(format!(
                    "task {} cannot move back to queued",
                    task_id
                )))
            }
        };

        self.with_tx(|conn| {
            let now = now_ts();
            let changed = conn.execute(
                r#"
                UPDATE make_task SET
                    status = ?3,
                    content = COALESCE(?4, content),
                    error = ?5,
                    started_at = CASE WHEN ?3 = 'running' THEN ?6 ELSE started_at END,
                    finished_at = CASE WHEN ?3 IN ('succeeded', 'failed') THEN ?6 ELSE finished_at END
                WHERE task_id = ?1 AND status = ?2
                "#,
                params![task_id, from.as_str(), to.as_str(), content, error, now],
            )?;

            let task = task_by_id(conn, task_id)?
                .ok_or_else(|| Error::NotFound(format!("task {}", task_id)))?;
            if changed == 0 {
                return Err(Error::Conflict(format!(
                    "task {} is {}, cannot move to {}",
                    task_id, task.status, to
                )));
            }
            Ok(task)
        })
    }

    pub fn append_task_log(&self, task_id: &str, line: &str) -> Result<()> {
        self.with_conn(|conn| insert_log(conn, task_id, line))
    }

    /// Full log text of a task, one line per entry, oldest first.
    pub fn task_log(&self, task_id: &str) -> Result<String> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT created_at, line FROM task_log WHERE task_id = ?1 ORDER BY id")?;
            let lines = stmt
                .query_map(params![task_id], |row| {
                    let at = time_column(row, 0)?;
                    let line: String = row.get(1)?;
                    Ok(format!("[{}] {}", at.format("%Y-%m-%d %H:%M:%S"), line))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(lines.join("\n"))
        })
    }

    /// Newest succeeded task.
    pub fn latest_article(&self) -> Result<Option<ArticleTask>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM make_task WHERE status = 'succeeded' \
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                TASK_COLUMNS
            );
            Ok(conn.query_row(&sql, [], task_from_row).optional()?)
        })
    }

    /// Replaces the draft of a succeeded, not yet approved task.
    pub fn update_task_content(&self, task_id: &str, content: &str) -> Result<ArticleTask> {
        self.with_tx(|conn| {
            let task = task_by_id(conn, task_id)?
                .ok_or_else(|| Error::NotFound(format!("task {}", task_id)))?;
            if task.status != TaskStatus::Succeeded {
                return Err(Error::Conflict(format!(
                    "task {} is {}, only finished drafts can be edited",
                    task_id, task.status
                )));
            }
            if task.review != ReviewState::Unreviewed {
                return Err(Error::Conflict(format!(
                    "task {} was already audited",
                    task_id
                )));
            }
            conn.execute(
                "UPDATE make_task SET content = ?2 WHERE task_id = ?1",
                params![task_id, content],
            )?;
            insert_log(conn, task_id, "draft edited manually")?;
            task_by_id(conn, task_id)?.ok_or_else(|| Error::NotFound(format!("task {}", task_id)))
        })
    }

    pub fn pending_review(&self) -> Result<Vec<ArticleTask>> {
        self.with_conn(|conn| {
            query_tasks(
                conn,
                "WHERE status = 'succeeded' AND review = 'unreviewed'",
                [],
            )
        })
    }

    /// Records the single review decision of a task.
    pub fn record_review(
        &self,
        task_id: &str,
        verdict: Verdict,
        notes: Option<&str>,
        edited_content: Option<&str>,
    ) -> Result<ReviewDecision> {
        self.with_tx(|conn| {
            let task = task_by_id(conn, task_id)?
                .ok_or_else(|| Error::NotFound(format!("task {}", task_id)))?;
            if task.status != TaskStatus::Succeeded {
                return Err(Error::Conflict(format!(
                    "task {} is {}, only succeeded tasks can be audited",
                    task_id, task.status
                )));
            }
            if task.review != ReviewState::Unreviewed {
                return Err(Error::Conflict(format!(
                    "task {} was already audited ({})",
                    task_id,
                    task.review.as_str()
                )));
            }

            let decided_at = Utc::now();
            conn.execute(
                "INSERT INTO review_decision (task_id, verdict, notes, decided_at) VALUES (?1, ?2, ?3, ?4)",
                params![task_id, verdict.as_str(), notes, ts(&decided_at)],
            )?;
            let content = if verdict == Verdict::Edited {
                edited_content
            } else {
                None
            };
            conn.execute(
                "UPDATE make_task SET review = ?2, content = COALESCE(?3, content) WHERE task_id = ?1",
                params![task_id, verdict.review_state().as_str(), content],
            )?;
            insert_log(conn, task_id, &format!("audited: {}", verdict.as_str()))?;

            Ok(ReviewDecision {
                task_id: task_id.to_string(),
                verdict,
                notes: notes.map(str::to_string),
                decided_at,
            })
        })
    }

    pub fn get_review(&self, task_id: &str) -> Result<Option<ReviewDecision>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT task_id, verdict, notes, decided_at FROM review_decision WHERE task_id = ?1",
                    params![task_id],
                    |row| {
                        Ok(ReviewDecision {
                            task_id: row.get(0)?,
                            verdict: enum_column(row, 1)?,
                            notes: row.get(2)?,
                            decided_at: time_column(row, 3)?,
                        })
                    },
                )
                .optional()?)
        })
    }

    /// Approved tasks with no successful publish attempt yet.
    pub fn approved_unpublished(&self) -> Result<Vec<ArticleTask>> {
        self.with_conn(|conn| {
            query_tasks(
                conn,
                "WHERE review = 'approved' AND NOT EXISTS (
                    SELECT 1 FROM publish_record p
                    WHERE p.article_id = make_task.task_id AND p.status = 'published')",
                [],
            )
        })
    }

    pub fn pending_articles(&self) -> Result<Vec<PendingArticle>> {
        let tasks = self.approved_unpublished()?;
        tasks
            .into_iter()
            .map(|task| {
                let approved_at = self.get_review(&task.task_id)?.map(|r| r.decided_at);
                Ok(PendingArticle {
                    title: task.title(),
                    article_id: task.task_id,
                    repo_name: task.repo_name,
                    approved_at,
                })
            })
            .collect()
    }

    /// Fails tasks left running by a previous process and returns the ids of
    /// queued tasks, oldest first, so they can be handed to workers again.
    pub fn recover_tasks(&self) -> Result<Vec<String>> {
        self.with_tx(|conn| {
            let running: Vec<String> = {
                let mut stmt = conn.prepare("SELECT task_id FROM make_task WHERE status = 'running'")?;
                let ids = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                ids
            };
            for task_id in &running {
                conn.execute(
                    "UPDATE make_task SET status = 'failed', error = ?2, finished_at = ?3 WHERE task_id = ?1",
                    params![task_id, "interrupted by restart", now_ts()],
                )?;
                insert_log(conn, task_id, "failed: interrupted by restart")?;
            }

            let mut stmt = conn.prepare(
                "SELECT task_id FROM make_task WHERE status = 'queued' ORDER BY created_at, rowid",
            )?;
            let queued = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(queued)
        })
    }
}
