use crate::error::Result;
use crate::models::review::{AuditRequest, ReviewDecision};
use crate::models::task::ArticleTask;
use crate::pipeline::Pipeline;

impl Pipeline {
    /// Succeeded drafts nobody has audited yet.
    pub fn pending_review(&self) -> Result<Vec<ArticleTask>> {
        self.storage.pending_review()
    }

    /// Records the one review decision a draft gets. Auditing twice is a
    /// conflict.
    pub fn audit(&self, request: AuditRequest) -> Result<ReviewDecision> {
        request.validate()?;
        let decision = self.storage.record_review(
            request.task_id.trim(),
            request.verdict,
            request.notes.as_deref(),
            request.content.as_deref(),
        )?;
        tracing::info!("Task {} audited: {}", decision.task_id, decision.verdict.as_str());
        Ok(decision)
    }
}
