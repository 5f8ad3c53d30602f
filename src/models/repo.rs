use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Error;
use crate::models::task::TaskStatus;

/// Repository as returned by the GitHub search and repository endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    pub html_url: String,
    pub description: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub stargazers_count: u32,
    #[serde(default)]
    pub forks_count: u32,
    pub owner: RepositoryOwner,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryOwner {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub items: Vec<Repository>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Discovered, README not fetched yet.
    Pending,
    Fetched,
    Failed,
    /// Stored from a simulated run; never ingested.
    Simulated,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Fetched => "fetched",
            RecordStatus::Failed => "failed",
            RecordStatus::Simulated => "simulated",
        }
    }
}

impl std::str::FromStr for RecordStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RecordStatus::Pending),
            "fetched" => Ok(RecordStatus::Fetched),
            "failed" => Ok(RecordStatus::Failed),
            "simulated" => Ok(RecordStatus::Simulated),
            other => Err(Error::ParseError(format!("unknown record status '{}'", other))),
        }
    }
}

/// A discovered repository. Keyed by `full_name`: pulling the same repository
/// again updates this row instead of adding one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoRecord {
    pub id: i64,
    pub full_name: String,
    pub url: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub stars: u32,
    pub forks: u32,
    pub pull_time: DateTime<Utc>,
    pub rule: Option<String>,
    pub pull_task_id: Option<String>,
    pub status: RecordStatus,
    pub summary: Option<String>,
    pub detail: Option<String>,
    pub readme_path: Option<String>,
}

/// Repository found by a pull run, before (or without) persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredRepo {
    pub full_name: String,
    pub url: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub stars: u32,
    pub forks: u32,
}

impl From<Repository> for DiscoveredRepo {
    fn from(repo: Repository) -> Self {
        Self {
            full_name: repo.full_name,
            url: repo.html_url,
            description: repo.description,
            language: repo.language,
            stars: repo.stargazers_count,
            forks: repo.forks_count,
        }
    }
}

impl DiscoveredRepo {
    pub fn owner_and_name(&self) -> Option<(&str, &str)> {
        split_full_name(&self.full_name)
    }
}

/// Splits `owner/name`, rejecting parts that are not safe as path segments.
pub fn split_full_name(full_name: &str) -> Option<(&str, &str)> {
    let (owner, name) = full_name.split_once('/')?;
    let valid = |part: &str| {
        !part.is_empty() && part != "." && part != ".." && !part.contains(['/', '\\'])
    };
    if valid(owner) && valid(name) {
        Some((owner, name))
    } else {
        None
    }
}

/// Pull record joined with the newest generation task created for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordView {
    #[serde(flatten)]
    pub record: RepoRecord,
    pub task_id: Option<String>,
    pub task_status: Option<TaskStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub keyword: Option<String>,
}

impl RecordQuery {
    pub const DEFAULT_PAGE_SIZE: u32 = 30;
    pub const MAX_PAGE_SIZE: u32 = 200;

    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
            .unwrap_or(Self::DEFAULT_PAGE_SIZE)
            .clamp(1, Self::MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.page_size())
    }

    pub fn keyword(&self) -> Option<&str> {
        self.keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReposQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoStats {
    pub total_repos: u64,
    pub total_stars: u64,
    pub total_forks: u64,
    pub language_distribution: BTreeMap<String, u64>,
    pub last_pull: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RePullRequest {
    pub id: Option<i64>,
    pub full_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_query_defaults_and_bounds() {
        let query = RecordQuery::default();
        assert_eq!(query.page(), 1);
        assert_eq!(query.page_size(), 30);
        assert_eq!(query.offset(), 0);

        let query = RecordQuery {
            page: Some(3),
            page_size: Some(5000),
            keyword: Some("   ".to_string()),
        };
        assert_eq!(query.page_size(), RecordQuery::MAX_PAGE_SIZE);
        assert_eq!(query.offset(), 400);
        assert_eq!(query.keyword(), None);
    }

    #[test]
    fn test_owner_and_name() {
        let repo = DiscoveredRepo {
            full_name: "octocat/Hello-World".to_string(),
            url: "https://github.com/octocat/Hello-World".to_string(),
            description: None,
            language: None,
            stars: 1,
            forks: 0,
        };
        assert_eq!(repo.owner_and_name(), Some(("octocat", "Hello-World")));

        let bad = DiscoveredRepo {
            full_name: "../etc".to_string(),
            ..repo
        };
        assert_eq!(bad.owner_and_name(), None);
    }
}
