use rusqlite::{params, OptionalExtension, Row};

use super::sqlite::{enum_column, json_column, now_ts, time_column, Storage};
use crate::error::{Error, Result};
use crate::models::analysis::{AnalysisResult, RepoFindings};
use crate::models::settings::ProviderKind;

const ANALYSIS_COLUMNS: &str =
    "id, repo_full_name, findings_json, provider, model, created_at";

fn analysis_from_row(row: &Row<'_>) -> rusqlite::Result<AnalysisResult> {
    Ok(AnalysisResult {
        id: row.get(0)?,
        repo_full_name: row.get(1)?,
        findings: json_column(row, 2)?,
        provider: enum_column(row, 3)?,
        model: row.get(4)?,
        created_at: time_column(row, 5)?,
    })
}

impl Storage {
    pub fn insert_analysis(
        &self,
        repo_full_name: &str,
        findings: &RepoFindings,
        provider: ProviderKind,
        model: &str,
    ) -> Result<AnalysisResult> {
        let findings_json = serde_json::to_string(findings)?;
        self.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO analysis_result (repo_full_name, findings_json, provider, model, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![repo_full_name, findings_json, provider.as_str(), model, now_ts()],
            )?;
            let id = conn.last_insert_rowid();
            let sql = format!("SELECT {} FROM analysis_result WHERE id = ?1", ANALYSIS_COLUMNS);
            conn.query_row(&sql, params![id], analysis_from_row)
                .map_err(Error::from)
        })
    }

    pub fn get_analysis(&self, id: i64) -> Result<Option<AnalysisResult>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM analysis_result WHERE id = ?1", ANALYSIS_COLUMNS);
            Ok(conn.query_row(&sql, params![id], analysis_from_row).optional()?)
        })
    }

    pub fn latest_analysis_for(&self, repo_full_name: &str) -> Result<Option<AnalysisResult>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM analysis_result WHERE repo_full_name = ?1 \
                 ORDER BY created_at DESC, id DESC LIMIT 1",
                ANALYSIS_COLUMNS
            );
            Ok(conn
                .query_row(&sql, params![repo_full_name], analysis_from_row)
                .optional()?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::settings::ConfigKind;

    #[test]
    fn test_analysis_round_trip_and_latest() {
        let storage = Storage::in_memory().unwrap();
        let findings = RepoFindings {
            summary: "first".to_string(),
            ..RepoFindings::default()
        };
        storage
            .insert_analysis("a/b", &findings, ProviderKind::OpenAi, "gpt-3.5-turbo")
            .unwrap();
        let second = storage
            .insert_analysis(
                "a/b",
                &RepoFindings {
                    summary: "second".to_string(),
                    ..RepoFindings::default()
                },
                ProviderKind::Anthropic,
                "claude-sonnet-4-20250514",
            )
            .unwrap();

        let latest = storage.latest_analysis_for("a/b").unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(latest.findings.summary, "second");
        assert_eq!(latest.provider, ProviderKind::Anthropic);
        assert!(storage.latest_analysis_for("x/y").unwrap().is_none());
    }

    #[test]
    fn test_settings_overwrite() {
        let storage = Storage::in_memory().unwrap();
        assert!(storage.load_setting(ConfigKind::Model).unwrap().is_none());
        storage.store_setting(ConfigKind::Model, r#"{"a":1}"#).unwrap();
        storage.store_setting(ConfigKind::Model, r#"{"b":2}"#).unwrap();
        assert_eq!(
            storage.load_setting(ConfigKind::Model).unwrap().as_deref(),
            Some(r#"{"b":2}"#)
        );
    }
}
