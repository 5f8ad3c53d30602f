use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};
use crate::models::repo::DiscoveredRepo;

/// Sort order passed to the GitHub search API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SortKey {
    #[default]
    #[serde(rename = "stars")]
    Stars,
    #[serde(rename = "forks")]
    Forks,
    #[serde(rename = "updated")]
    Updated,
    #[serde(rename = "help-wanted-issues")]
    HelpWantedIssues,
    #[serde(rename = "best_match")]
    BestMatch,
}

impl SortKey {
    /// Value of the `sort` query parameter; best match means omitting it.
    pub fn as_query(&self) -> Option<&'static str> {
        match self {
            SortKey::Stars => Some("stars"),
            SortKey::Forks => Some("forks"),
            SortKey::Updated => Some("updated"),
            SortKey::HelpWantedIssues => Some("help-wanted-issues"),
            SortKey::BestMatch => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.as_query().unwrap_or("best_match")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PullRule {
    #[default]
    MostStars,
    MostForks,
    RecentlyUpdated,
    HelpWanted,
    BestMatch,
    Trending,
}

impl PullRule {
    pub fn sort_key(&self) -> SortKey {
        match self {
            PullRule::MostStars | PullRule::Trending => SortKey::Stars,
            PullRule::MostForks => SortKey::Forks,
            PullRule::RecentlyUpdated => SortKey::Updated,
            PullRule::HelpWanted => SortKey::HelpWantedIssues,
            PullRule::BestMatch => SortKey::BestMatch,
        }
    }
}

/// Keywords arrive either as `"a, b"` or as `["a", "b"]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum KeywordsInput {
    Text(String),
    List(Vec<String>),
}

impl KeywordsInput {
    fn into_list(self) -> Vec<String> {
        let raw = match self {
            KeywordsInput::Text(text) => text.split(',').map(str::to_string).collect(),
            KeywordsInput::List(list) => list,
        };
        raw.into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect()
    }
}

fn deserialize_keywords<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(KeywordsInput::deserialize(deserializer)?.into_list())
}

fn deserialize_optional_keywords<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let input = Option::<KeywordsInput>::deserialize(deserializer)?;
    Ok(input.map(KeywordsInput::into_list).filter(|k| !k.is_empty()))
}

/// Saved discovery parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PullConfig {
    pub sources: Vec<String>,
    #[serde(deserialize_with = "deserialize_keywords")]
    pub keywords: Vec<String>,
    pub rule: PullRule,
    /// Total repositories per run, across all keywords.
    pub batch: u32,
    pub concurrency: u32,
    pub per_project_delay_secs: u64,
    pub simulate: bool,
    pub frequency: Option<String>,
    pub weekday: Option<u8>,
    pub start_time: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            sources: vec!["github".to_string()],
            keywords: vec!["GPT".to_string()],
            rule: PullRule::MostStars,
            batch: 10,
            concurrency: 1,
            per_project_delay_secs: 0,
            simulate: false,
            frequency: None,
            weekday: None,
            start_time: None,
            updated_at: None,
        }
    }
}

impl PullConfig {
    pub const MAX_BATCH: u32 = 100;
    pub const MAX_CONCURRENCY: u32 = 16;

    pub fn validate(&self) -> Result<()> {
        if self.keywords.is_empty() {
            return Err(Error::Validation("at least one keyword is required".to_string()));
        }
        validate_limit(self.batch)?;
        if self.concurrency == 0 || self.concurrency > Self::MAX_CONCURRENCY {
            return Err(Error::Validation(format!(
                "concurrency must be between 1 and {}",
                Self::MAX_CONCURRENCY
            )));
        }
        if let Some(frequency) = &self.frequency {
            if frequency != "daily" && frequency != "weekly" {
                return Err(Error::Validation(format!(
                    "frequency must be 'daily' or 'weekly', got '{}'",
                    frequency
                )));
            }
        }
        if matches!(self.weekday, Some(day) if day > 6) {
            return Err(Error::Validation("weekday must be between 0 and 6".to_string()));
        }
        if let Some(start) = &self.start_time {
            if !is_clock_time(start) {
                return Err(Error::Validation(format!(
                    "start_time must be HH:MM, got '{}'",
                    start
                )));
            }
        }
        Ok(())
    }
}

pub(crate) fn validate_limit(limit: u32) -> Result<()> {
    if limit == 0 || limit > PullConfig::MAX_BATCH {
        return Err(Error::Validation(format!(
            "limit must be between 1 and {}",
            PullConfig::MAX_BATCH
        )));
    }
    Ok(())
}

pub(crate) fn is_clock_time(value: &str) -> bool {
    match value.split_once(':') {
        Some((h, m)) if h.len() == 2 && m.len() == 2 => {
            matches!((h.parse::<u8>(), m.parse::<u8>()), (Ok(h), Ok(m)) if h < 24 && m < 60)
        }
        _ => false,
    }
}

fn default_keyword() -> String {
    "GPT".to_string()
}

fn default_limit() -> u32 {
    10
}

/// Parameters of an ad-hoc pull run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRunRequest {
    #[serde(default = "default_keyword")]
    pub keyword: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub sort: SortKey,
    #[serde(default)]
    pub simulate: bool,
    #[serde(default)]
    pub task_id: Option<String>,
}

impl Default for PullRunRequest {
    fn default() -> Self {
        Self {
            keyword: default_keyword(),
            limit: default_limit(),
            sort: SortKey::Stars,
            simulate: false,
            task_id: None,
        }
    }
}

/// Overrides applied on top of the saved [`PullConfig`] for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullByConfigRequest {
    #[serde(default, deserialize_with = "deserialize_optional_keywords")]
    pub keywords: Option<Vec<String>>,
    #[serde(default)]
    pub simulate: bool,
    #[serde(default)]
    pub task_id: Option<String>,
}

/// Fully resolved pull run, shared by the ad-hoc and saved-config paths.
#[derive(Debug, Clone, PartialEq)]
pub struct PullPlan {
    pub keywords: Vec<String>,
    pub limit: u32,
    pub sort: SortKey,
    pub simulate: bool,
    pub task_id: Option<String>,
    pub concurrency: u32,
    pub per_project_delay_secs: u64,
}

impl PullPlan {
    pub fn from_request(request: PullRunRequest) -> Result<Self> {
        let keyword = request.keyword.trim().to_string();
        if keyword.is_empty() {
            return Err(Error::Validation("keyword must not be empty".to_string()));
        }
        validate_limit(request.limit)?;
        Ok(Self {
            keywords: vec![keyword],
            limit: request.limit,
            sort: request.sort,
            simulate: request.simulate,
            task_id: request.task_id,
            concurrency: 1,
            per_project_delay_secs: 0,
        })
    }

    pub fn from_config(config: &PullConfig, overrides: PullByConfigRequest) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            keywords: overrides.keywords.unwrap_or_else(|| config.keywords.clone()),
            limit: config.batch,
            sort: config.rule.sort_key(),
            simulate: overrides.simulate || config.simulate,
            task_id: overrides.task_id,
            concurrency: config.concurrency,
            per_project_delay_secs: config.per_project_delay_secs,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRunResult {
    pub count: usize,
    pub keywords: Vec<String>,
    pub sort: SortKey,
    pub simulated: bool,
    /// Whether the discovered repositories were written to the record store.
    pub persisted: bool,
    pub status: String,
    pub repos: Vec<DiscoveredRepo>,
}

/// Outcome of regenerating descriptions from cached READMEs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReanalyzeResult {
    pub count: usize,
    pub repos: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullTestResult {
    pub config: PullConfig,
    pub sort: SortKey,
    pub preview: Vec<DiscoveredRepo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_from_comma_string() {
        let config: PullConfig =
            serde_json::from_str(r#"{"keywords": "ai,  data , ,rust", "rule": "best_match"}"#)
                .unwrap();
        assert_eq!(config.keywords, vec!["ai", "data", "rust"]);
        assert_eq!(config.rule.sort_key(), SortKey::BestMatch);
        assert_eq!(config.batch, 10);
    }

    #[test]
    fn test_keywords_from_list() {
        let config: PullConfig =
            serde_json::from_str(r#"{"keywords": [" vue3 ", ""], "batch": 5}"#).unwrap();
        assert_eq!(config.keywords, vec!["vue3"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_fields() {
        let mut config = PullConfig {
            batch: 0,
            ..PullConfig::default()
        };
        assert!(config.validate().is_err());

        config.batch = 10;
        config.start_time = Some("9:30".to_string());
        assert!(config.validate().is_err());

        config.start_time = Some("09:30".to_string());
        config.weekday = Some(7);
        assert!(config.validate().is_err());

        config.weekday = Some(1);
        config.keywords.clear();
        assert!(matches!(config.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_rule_to_sort_mapping() {
        assert_eq!(PullRule::MostForks.sort_key(), SortKey::Forks);
        assert_eq!(PullRule::RecentlyUpdated.sort_key(), SortKey::Updated);
        assert_eq!(PullRule::HelpWanted.sort_key(), SortKey::HelpWantedIssues);
        assert_eq!(PullRule::Trending.sort_key(), SortKey::Stars);
        assert_eq!(SortKey::BestMatch.as_query(), None);
    }

    #[test]
    fn test_plan_from_config_prefers_override_keywords() {
        let config = PullConfig {
            keywords: vec!["GPT".to_string(), "AI".to_string()],
            batch: 1,
            ..PullConfig::default()
        };
        let overrides: PullByConfigRequest =
            serde_json::from_str(r#"{"simulate": true, "keywords": "vue3"}"#).unwrap();
        let plan = PullPlan::from_config(&config, overrides).unwrap();
        assert_eq!(plan.keywords, vec!["vue3"]);
        assert!(plan.simulate);
        assert_eq!(plan.limit, 1);

        let plan = PullPlan::from_config(&config, PullByConfigRequest::default()).unwrap();
        assert_eq!(plan.keywords, vec!["GPT", "AI"]);
    }

    #[test]
    fn test_run_request_defaults() {
        let request: PullRunRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.keyword, "GPT");
        assert_eq!(request.limit, 10);
        assert_eq!(request.sort, SortKey::Stars);
        assert!(PullPlan::from_request(PullRunRequest {
            limit: 101,
            ..request
        })
        .is_err());
    }
}
