use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptScene {
    ArticleGeneration,
    RepoDetail,
    RepoSummary,
}

impl PromptScene {
    pub const ALL: [PromptScene; 3] = [
        PromptScene::ArticleGeneration,
        PromptScene::RepoDetail,
        PromptScene::RepoSummary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PromptScene::ArticleGeneration => "article_generation",
            PromptScene::RepoDetail => "repo_detail",
            PromptScene::RepoSummary => "repo_summary",
        }
    }
}

impl std::str::FromStr for PromptScene {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "article_generation" => Ok(PromptScene::ArticleGeneration),
            "repo_detail" => Ok(PromptScene::RepoDetail),
            "repo_summary" => Ok(PromptScene::RepoSummary),
            other => Err(Error::Validation(format!("unknown prompt scene '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: i64,
    pub scene: PromptScene,
    pub name: String,
    pub content: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create (no `id`) or update (with `id`) a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavePromptRequest {
    #[serde(default)]
    pub id: Option<i64>,
    pub scene: PromptScene,
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub is_default: bool,
}

impl SavePromptRequest {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("prompt name is required".to_string()));
        }
        if self.content.trim().is_empty() {
            return Err(Error::Validation("prompt content is required".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetDefaultRequest {
    pub id: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptQuery {
    pub scene: Option<PromptScene>,
}
