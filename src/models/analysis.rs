use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::settings::ProviderKind;

/// Structured output of the repository analysis prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoFindings {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    #[serde(default)]
    pub use_cases: Vec<String>,
    #[serde(default)]
    pub audience: Option<String>,
}

impl RepoFindings {
    /// Flattened text used as generation input.
    pub fn to_detail(&self) -> String {
        let mut out = self.summary.trim().to_string();
        let sections = [
            ("Highlights", &self.highlights),
            ("Tech stack", &self.tech_stack),
            ("Use cases", &self.use_cases),
        ];
        for (title, items) in sections {
            if items.is_empty() {
                continue;
            }
            out.push_str(&format!("\n\n{}:\n", title));
            for item in items {
                out.push_str(&format!("- {}\n", item));
            }
        }
        if let Some(audience) = &self.audience {
            out.push_str(&format!("\nAudience: {}\n", audience));
        }
        out.trim().to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: i64,
    pub repo_full_name: String,
    pub findings: RepoFindings,
    pub provider: ProviderKind,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

/// Per-call model settings. They win over the saved model config for one
/// call and are never written back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelOverride {
    #[serde(default, alias = "external_api_key")]
    pub api_key: Option<String>,
    #[serde(default, alias = "model_provider")]
    pub provider: Option<String>,
    #[serde(default, alias = "model_base_url")]
    pub base_url: Option<String>,
    #[serde(default, alias = "model_name")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub repo_full_name: String,
    #[serde(flatten)]
    pub overrides: ModelOverride,
}
