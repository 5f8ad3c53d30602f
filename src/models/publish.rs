use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    Published,
    Failed,
}

impl PublishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStatus::Published => "published",
            PublishStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for PublishStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "published" => Ok(PublishStatus::Published),
            "failed" => Ok(PublishStatus::Failed),
            other => Err(Error::ParseError(format!("unknown publish status '{}'", other))),
        }
    }
}

/// One attempt to publish an article to one target. Never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRecord {
    pub id: i64,
    pub article_id: String,
    pub title: String,
    pub target: String,
    pub status: PublishStatus,
    pub link: Option<String>,
    pub message: Option<String>,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishRequest {
    pub article_id: String,
    /// Target names; empty means every configured target.
    #[serde(default)]
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetOutcome {
    pub target: String,
    pub status: PublishStatus,
    pub link: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishReport {
    pub article_id: String,
    pub outcomes: Vec<TargetOutcome>,
}

impl PublishReport {
    pub fn all_published(&self) -> bool {
        !self.outcomes.is_empty()
            && self
                .outcomes
                .iter()
                .all(|o| o.status == PublishStatus::Published)
    }
}

/// Approved article waiting for its first successful publication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingArticle {
    pub article_id: String,
    pub repo_name: Option<String>,
    pub title: String,
    pub approved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishLink {
    pub article_id: String,
    pub title: String,
    pub target: String,
    pub link: String,
    pub published_at: DateTime<Utc>,
}

/// Article handed to a publisher.
#[derive(Debug, Clone)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub content: String,
    pub repo_name: Option<String>,
}
