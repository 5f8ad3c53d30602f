use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::models::task::ReviewState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    Rejected,
    /// Approved with reviewer-supplied replacement content.
    Edited,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Approved => "approved",
            Verdict::Rejected => "rejected",
            Verdict::Edited => "edited",
        }
    }

    pub fn review_state(&self) -> ReviewState {
        match self {
            Verdict::Approved | Verdict::Edited => ReviewState::Approved,
            Verdict::Rejected => ReviewState::Rejected,
        }
    }
}

impl std::str::FromStr for Verdict {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(Verdict::Approved),
            "rejected" => Ok(Verdict::Rejected),
            "edited" => Ok(Verdict::Edited),
            other => Err(Error::ParseError(format!("unknown verdict '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewDecision {
    pub task_id: String,
    pub verdict: Verdict,
    pub notes: Option<String>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRequest {
    pub task_id: String,
    pub verdict: Verdict,
    #[serde(default)]
    pub notes: Option<String>,
    /// Replacement article body, required for [`Verdict::Edited`].
    #[serde(default)]
    pub content: Option<String>,
}

impl AuditRequest {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.task_id.trim().is_empty() {
            return Err(Error::Validation("task_id is required".to_string()));
        }
        if self.verdict == Verdict::Edited
            && self.content.as_deref().map_or(true, |c| c.trim().is_empty())
        {
            return Err(Error::Validation(
                "an edited verdict needs the edited content".to_string(),
            ));
        }
        Ok(())
    }
}
