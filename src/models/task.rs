use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }

    /// Tasks only move forward: queued, running, then one terminal state.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Queued, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Succeeded)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(TaskStatus::Queued),
            "running" => Ok(TaskStatus::Running),
            "succeeded" => Ok(TaskStatus::Succeeded),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(Error::ParseError(format!("unknown task status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    Unreviewed,
    Approved,
    Rejected,
}

impl ReviewState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewState::Unreviewed => "unreviewed",
            ReviewState::Approved => "approved",
            ReviewState::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for ReviewState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unreviewed" => Ok(ReviewState::Unreviewed),
            "approved" => Ok(ReviewState::Approved),
            "rejected" => Ok(ReviewState::Rejected),
            other => Err(Error::ParseError(format!("unknown review state '{}'", other))),
        }
    }
}

/// One article generation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleTask {
    pub task_id: String,
    pub repo_name: Option<String>,
    pub analysis_id: Option<i64>,
    pub pull_record_id: Option<i64>,
    pub prompt_id: Option<i64>,
    /// Set on tasks created by regeneration.
    pub parent_task_id: Option<String>,
    pub suggestions: Option<String>,
    pub status: TaskStatus,
    pub review: ReviewState,
    pub content: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ArticleTask {
    /// Article title: the first Markdown heading, falling back to the repository name.
    pub fn title(&self) -> String {
        self.content
            .as_deref()
            .and_then(|content| {
                content
                    .lines()
                    .map(str::trim)
                    .find(|line| line.starts_with('#'))
                    .map(|line| line.trim_start_matches('#').trim().to_string())
            })
            .filter(|title| !title.is_empty())
            .or_else(|| self.repo_name.clone())
            .unwrap_or_else(|| self.task_id.clone())
    }
}

pub fn new_task_id() -> String {
    let short = uuid::Uuid::new_v4().simple().to_string();
    format!("task_{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), &short[..8])
}

/// Input of a new generation task, after references were resolved.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub repo_name: Option<String>,
    pub analysis_id: Option<i64>,
    pub pull_record_id: Option<i64>,
    pub prompt_id: Option<i64>,
    pub parent_task_id: Option<String>,
    pub suggestions: Option<String>,
    /// Prior draft a regeneration starts from.
    pub seed_content: Option<String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub analysis_id: Option<i64>,
    pub pull_record_id: Option<i64>,
    pub repo_name: Option<String>,
    pub prompt_id: Option<i64>,
}

/// `input_ref` is either a pull record id or a repository full name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub input_ref: Option<String>,
    pub prompt_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegenerateRequest {
    /// Defaults to the newest succeeded task.
    pub task_id: Option<String>,
    pub suggestions: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaveArticleRequest {
    pub content: String,
    pub task_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestArticle {
    pub task_id: String,
    pub repo_name: Option<String>,
    pub title: String,
    pub content: String,
    pub status: TaskStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLog {
    pub task_id: String,
    pub status: TaskStatus,
    pub log: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_are_forward_only() {
        use TaskStatus::*;
        assert!(Queued.can_transition_to(Running));
        assert!(Running.can_transition_to(Succeeded));
        assert!(Running.can_transition_to(Failed));
        assert!(!Queued.can_transition_to(Succeeded));
        assert!(!Running.can_transition_to(Queued));
        for terminal in [Succeeded, Failed] {
            assert!(terminal.is_terminal());
            for next in [Queued, Running, Succeeded, Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_task_id_format() {
        let id = new_task_id();
        assert!(id.starts_with("task_"));
        let parts: Vec<_> = id.split('_').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[3].len(), 8);
        assert_ne!(id, new_task_id());
    }

    #[test]
    fn test_title_from_heading() {
        let mut task = ArticleTask {
            task_id: "task_1".to_string(),
            repo_name: Some("octocat/hello".to_string()),
            analysis_id: None,
            pull_record_id: None,
            prompt_id: None,
            parent_task_id: None,
            suggestions: None,
            status: TaskStatus::Succeeded,
            review: ReviewState::Unreviewed,
            content: Some("intro\n## A Friendly Greeter\nbody".to_string()),
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };
        assert_eq!(task.title(), "A Friendly Greeter");

        task.content = Some("no heading".to_string());
        assert_eq!(task.title(), "octocat/hello");
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in ["queued", "running", "succeeded", "failed"] {
            let parsed: TaskStatus = status.parse().unwrap();
            assert_eq!(parsed.as_str(), status);
        }
        assert!("done".parse::<TaskStatus>().is_err());
    }
}
