pub mod analysis;
pub mod prompt;
pub mod publish;
pub mod pull;
pub mod repo;
pub mod review;
pub mod settings;
pub mod task;

pub use analysis::{AnalysisResult, AnalyzeRequest, ModelOverride, RepoFindings};
pub use prompt::{PromptScene, PromptTemplate, SavePromptRequest};
pub use publish::{PublishRecord, PublishReport, PublishRequest, PublishStatus};
pub use pull::{PullConfig, PullRule, PullRunRequest, SortKey};
pub use repo::{DiscoveredRepo, RecordQuery, RepoRecord, Repository};
pub use review::{AuditRequest, ReviewDecision, Verdict};
pub use settings::{ConfigDocument, ConfigKind, ModelConfig, PublishConfig, TestOutcome};
pub use task::{ArticleTask, ReviewState, TaskStatus};
