use rusqlite::{params, Connection, OptionalExtension, Row};

use super::sqlite::{enum_column, now_ts, time_column, Storage};
use crate::error::{Error, Result};
use crate::models::prompt::{PromptScene, PromptTemplate, SavePromptRequest};

const PROMPT_COLUMNS: &str = "id, scene, name, content, is_default, created_at, updated_at";

fn prompt_from_row(row: &Row<'_>) -> rusqlite::Result<PromptTemplate> {
    Ok(PromptTemplate {
        id: row.get(0)?,
        scene: enum_column(row, 1)?,
        name: row.get(2)?,
        content: row.get(3)?,
        is_default: row.get::<_, i64>(4)? != 0,
        created_at: time_column(row, 5)?,
        updated_at: time_column(row, 6)?,
    })
}

fn prompt_by_id(conn: &Connection, id: i64) -> Result<Option<PromptTemplate>> {
    let sql = format!("SELECT {} FROM prompt_config WHERE id = ?1", PROMPT_COLUMNS);
    Ok(conn.query_row(&sql, params![id], prompt_from_row).optional()?)
}

fn require_prompt(conn: &Connection, id: i64) -> Result<PromptTemplate> {
    prompt_by_id(conn, id)?.ok_or_else(|| Error::NotFound(format!("prompt {}", id)))
}

fn scene_has_default(conn: &Connection, scene: PromptScene) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM prompt_config WHERE scene = ?1 AND is_default = 1",
        params![scene.as_str()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Clears the scene's current default and marks `id`. Callers hold a transaction.
fn mark_default(conn: &Connection, scene: PromptScene, id: i64) -> Result<()> {
    conn.execute(
        "UPDATE prompt_config SET is_default = 0 WHERE scene = ?1 AND is_default = 1",
        params![scene.as_str()],
    )?;
    conn.execute(
        "UPDATE prompt_config SET is_default = 1, updated_at = ?2 WHERE id = ?1",
        params![id, now_ts()],
    )?;
    Ok(())
}

impl Storage {
    pub fn list_prompts(&self, scene: Option<PromptScene>) -> Result<Vec<PromptTemplate>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM prompt_config WHERE (?1 IS NULL OR scene = ?1) ORDER BY scene, id",
                PROMPT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let prompts = stmt
                .query_map(params![scene.map(|s| s.as_str())], prompt_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(prompts)
        })
    }

    pub fn get_prompt(&self, id: i64) -> Result<Option<PromptTemplate>> {
        self.with_conn(|conn| prompt_by_id(conn, id))
    }

    pub fn default_prompt(&self, scene: PromptScene) -> Result<Option<PromptTemplate>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM prompt_config WHERE scene = ?1 AND is_default = 1",
                PROMPT_COLUMNS
            );
            Ok(conn
                .query_row(&sql, params![scene.as_str()], prompt_from_row)
                .optional()?)
        })
    }

    /// Creates or updates a template. The first template of a scene always
    /// becomes its default.
    pub fn save_prompt(&self, request: &SavePromptRequest) -> Result<PromptTemplate> {
        self.with_tx(|conn| {
            let now = now_ts();
            let id = match request.id {
                Some(id) => {
                    let existing = require_prompt(conn, id)?;
                    if existing.scene != request.scene {
                        return Err(Error::Validation(format!(
                            "prompt {} belongs to scene {}",
                            id,
                            existing.scene.as_str()
                        )));
                    }
                    conn.execute(
                        "UPDATE prompt_config SET name = ?2, content = ?3, updated_at = ?4 WHERE id = ?1",
                        params![id, request.name.trim(), request.content, now],
                    )?;
                    id
                }
                None => {
                    conn.execute(
                        r#"
                        INSERT INTO prompt_config (scene, name, content, is_default, created_at, updated_at)
                        VALUES (?1, ?2, ?3, 0, ?4, ?4)
                        "#,
                        params![request.scene.as_str(), request.name.trim(), request.content, now],
                    )?;
                    conn.last_insert_rowid()
                }
            };

            if request.is_default || !scene_has_default(conn, request.scene)? {
                mark_default(conn, request.scene, id)?;
            }
            require_prompt(conn, id)
        })
    }

    /// Makes `id` the only default of its scene.
    pub fn set_default_prompt(&self, id: i64) -> Result<PromptTemplate> {
        self.with_tx(|conn| {
            let prompt = require_prompt(conn, id)?;
            mark_default(conn, prompt.scene, id)?;
            require_prompt(conn, id)
        })
    }

    /// Deletes a template. When it was the default, the oldest remaining
    /// template of the scene takes over.
    pub fn delete_prompt(&self, id: i64) -> Result<PromptTemplate> {
        self.with_tx(|conn| {
            let prompt = require_prompt(conn, id)?;
            conn.execute("DELETE FROM prompt_config WHERE id = ?1", params![id])?;
            if prompt.is_default {
                let successor: Option<i64> = conn
                    .query_row(
                        "SELECT id FROM prompt_config WHERE scene = ?1 ORDER BY created_at, id LIMIT 1",
                        params![prompt.scene.as_str()],
                        |row| row.get(0),
                    )
                    .optional()?;
                if let Some(successor) = successor {
                    mark_default(conn, prompt.scene, successor)?;
                }
            }
            Ok(prompt)
        })
    }

    /// Inserts the built-in templates into scenes that have none.
    pub fn seed_prompts(&self, seeds: &[(PromptScene, &str, &str)]) -> Result<usize> {
        self.with_tx(|conn| {
            let mut inserted = 0;
            for scene in PromptScene::ALL {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM prompt_config WHERE scene = ?1",
                    params![scene.as_str()],
                    |row| row.get(0),
                )?;
                if count > 0 {
                    continue;
                }
                let now = now_ts();
                for (position, (_, name, content)) in
                    seeds.iter().filter(|(s, _, _)| *s == scene).enumerate()
                {
                    conn.execute(
                        r#"
                        INSERT INTO prompt_config (scene, name, content, is_default, created_at, updated_at)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                        "#,
                        params![scene.as_str(), name, content, position == 0, now],
                    )?;
                    inserted += 1;
                }
            }
            Ok(inserted)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(scene: PromptScene, name: &str, is_default: bool) -> SavePromptRequest {
        SavePromptRequest {
            id: None,
            scene,
            name: name.to_string(),
            content: format!("{} body {{content}}", name),
            is_default,
        }
    }

    fn defaults(storage: &Storage, scene: PromptScene) -> Vec<i64> {
        storage
            .list_prompts(Some(scene))
            .unwrap()
            .into_iter()
            .filter(|p| p.is_default)
            .map(|p| p.id)
            .collect()
    }

    #[test]
    fn test_first_prompt_becomes_default() {
        let storage = Storage::in_memory().unwrap();
        let first = storage
            .save_prompt(&request(PromptScene::ArticleGeneration, "tech", false))
            .unwrap();
        let second = storage
            .save_prompt(&request(PromptScene::ArticleGeneration, "casual", false))
            .unwrap();
        assert!(first.is_default);
        assert!(!second.is_default);
        assert_eq!(defaults(&storage, PromptScene::ArticleGeneration), vec![first.id]);
    }

    #[test]
    fn test_set_default_leaves_exactly_one() {
        let storage = Storage::in_memory().unwrap();
        let a = storage
            .save_prompt(&request(PromptScene::ArticleGeneration, "a", false))
            .unwrap();
        let b = storage
            .save_prompt(&request(PromptScene::ArticleGeneration, "b", false))
            .unwrap();
        let other = storage
            .save_prompt(&request(PromptScene::RepoSummary, "summary", false))
            .unwrap();

        storage.set_default_prompt(a.id).unwrap();
        storage.set_default_prompt(b.id).unwrap();

        assert_eq!(defaults(&storage, PromptScene::ArticleGeneration), vec![b.id]);
        assert_eq!(defaults(&storage, PromptScene::RepoSummary), vec![other.id]);
        assert!(matches!(storage.set_default_prompt(999), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_deleting_default_promotes_oldest() {
        let storage = Storage::in_memory().unwrap();
        let a = storage
            .save_prompt(&request(PromptScene::RepoDetail, "a", false))
            .unwrap();
        let b = storage
            .save_prompt(&request(PromptScene::RepoDetail, "b", false))
            .unwrap();
        let c = storage
            .save_prompt(&request(PromptScene::RepoDetail, "c", true))
            .unwrap();
        assert_eq!(defaults(&storage, PromptScene::RepoDetail), vec![c.id]);

        storage.delete_prompt(c.id).unwrap();
        assert_eq!(defaults(&storage, PromptScene::RepoDetail), vec![a.id]);

        storage.delete_prompt(b.id).unwrap();
        storage.delete_prompt(a.id).unwrap();
        assert!(storage.default_prompt(PromptScene::RepoDetail).unwrap().is_none());
    }

    #[test]
    fn test_update_cannot_change_scene() {
        let storage = Storage::in_memory().unwrap();
        let a = storage
            .save_prompt(&request(PromptScene::RepoDetail, "a", false))
            .unwrap();
        let mut update = request(PromptScene::RepoSummary, "a2", false);
        update.id = Some(a.id);
        assert!(matches!(storage.save_prompt(&update), Err(Error::Validation(_))));

        update.scene = PromptScene::RepoDetail;
        let updated = storage.save_prompt(&update).unwrap();
        assert_eq!(updated.name, "a2");
        assert!(updated.is_default);
    }

    #[test]
    fn test_seed_only_fills_empty_scenes() {
        let storage = Storage::in_memory().unwrap();
        let seeds = [
            (PromptScene::ArticleGeneration, "one", "1 {content}"),
            (PromptScene::ArticleGeneration, "two", "2 {content}"),
            (PromptScene::RepoSummary, "sum", "s {content}"),
        ];
        assert_eq!(storage.seed_prompts(&seeds).unwrap(), 3);
        assert_eq!(storage.seed_prompts(&seeds).unwrap(), 0);

        let default = storage
            .default_prompt(PromptScene::ArticleGeneration)
            .unwrap()
            .unwrap();
        assert_eq!(default.name, "one");
    }
}
