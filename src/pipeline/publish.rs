use crate::error::{Error, Result};
use crate::models::publish::{
    Article, PendingArticle, PublishLink, PublishRecord, PublishReport, PublishRequest,
    PublishStatus, TargetOutcome,
};
use crate::models::settings::{PublishConfig, PublishTargetConfig};
use crate::models::task::ReviewState;
use crate::pipeline::Pipeline;

impl Pipeline {
    /// Approved articles without a successful publication.
    pub fn publish_pending(&self) -> Result<Vec<PendingArticle>> {
        self.storage.pending_articles()
    }

    /// Publishes an approved article to the named targets, or to every
    /// configured target when none are named. Each target gets its own
    /// outcome; one failing target does not stop the others.
    pub async fn publish(&self, request: PublishRequest) -> Result<PublishReport> {
        let task = self.task(request.article_id.trim())?;
        if task.review != ReviewState::Approved {
            return Err(Error::Conflict(format!(
                "article {} is {}, only approved articles can be published",
                task.task_id,
                task.review.as_str()
            )));
        }

        let config: PublishConfig = self.registry.load()?;
        let targets = select_targets(&config, &request.targets)?;

        let article = Article {
            title: task.title(),
            content: task.content.clone().unwrap_or_default(),
            repo_name: task.repo_name.clone(),
            id: task.task_id.clone(),
        };

        let mut outcomes = Vec::with_capacity(targets.len());
        for target in targets {
            let outcome = self.publish_to(target, &article).await;
            self.storage.insert_publish(&article.id, &article.title, &outcome)?;
            outcomes.push(outcome);
        }

        let report = PublishReport {
            article_id: article.id,
            outcomes,
        };
        tracing::info!(
            "Published {} ({} target(s), all succeeded: {})",
            report.article_id,
            report.outcomes.len(),
            report.all_published()
        );
        Ok(report)
    }

    async fn publish_to(&self, target: &PublishTargetConfig, article: &Article) -> TargetOutcome {
        let published = match self.publishers.build(target) {
            Ok(publisher) => publisher.publish(article).await,
            Err(e) => Err(e),
        };
        match published {
            Ok(link) => TargetOutcome {
                target: target.name.clone(),
                status: PublishStatus::Published,
                link: Some(link),
                message: None,
            },
            Err(e) => {
                tracing::warn!("Publishing {} to {} failed: {}", article.id, target.name, e);
                TargetOutcome {
                    target: target.name.clone(),
                    status: PublishStatus::Failed,
                    link: None,
                    message: Some(e.to_string()),
                }
            }
        }
    }

    pub fn publish_history(&self) -> Result<Vec<PublishRecord>> {
        self.storage.publish_history()
    }

    pub fn publish_links(&self) -> Result<Vec<PublishLink>> {
        self.storage.publish_links()
    }
}

fn select_targets<'a>(
    config: &'a PublishConfig,
    names: &[String],
) -> Result<Vec<&'a PublishTargetConfig>> {
    if names.is_empty() {
        if config.targets.is_empty() {
            return Err(Error::Validation("no publish targets configured".to_string()));
        }
        return Ok(config.targets.iter().collect());
    }
    names
        .iter()
        .map(|name| {
            config
                .target(name.trim())
                .ok_or_else(|| Error::Validation(format!("unknown publish target '{}'", name)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::review::{AuditRequest, Verdict};
    use crate::models::settings::ConfigKind;
    use crate::models::task::{NewTask, TaskStatus};
    use crate::test_support::{pipeline_with, FakeProviderFactory};
    use serde_json::json;

    fn approved(pipeline: &Pipeline) -> String {
        let storage = pipeline.storage();
        let (task, _) = storage
            .insert_task(&NewTask {
                repo_name: Some("octo/site".to_string()),
                ..NewTask::default()
            })
            .unwrap();
        storage
            .transition_task(&task.task_id, TaskStatus::Running, None, None)
            .unwrap();
        storage
            .transition_task(&task.task_id, TaskStatus::Succeeded, Some("# Site launch\n\nhi"), None)
            .unwrap();
        pipeline
            .audit(AuditRequest {
                task_id: task.task_id.clone(),
                verdict: Verdict::Approved,
                notes: None,
                content: None,
            })
            .unwrap();
        task.task_id
    }

    #[tokio::test]
    async fn test_partial_success_is_reported_per_target() {
        let (pipeline, _github, _dir) = pipeline_with(FakeProviderFactory::replying("ok"));
        pipeline
            .registry()
            .save(
                ConfigKind::Publish,
                json!({"targets": [
                    {"name": "blog", "kind": "webhook", "endpoint": "https://blog.example.com/hook"},
                    {"name": "down", "kind": "webhook", "endpoint": "https://down.example.com/hook"}
                ]}),
            )
            .unwrap();
        let article_id = approved(&pipeline);

        let report = pipeline
            .publish(PublishRequest {
                article_id: article_id.clone(),
                targets: Vec::new(),
            })
            .await
            .unwrap();
        assert_eq!(report.outcomes.len(), 2);
        assert!(!report.all_published());
        assert_eq!(report.outcomes[0].status, PublishStatus::Published);
        assert_eq!(report.outcomes[1].status, PublishStatus::Failed);

        assert_eq!(pipeline.publish_history().unwrap().len(), 2);
        let links = pipeline.publish_links().unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].title, "Site launch");
        assert!(pipeline.publish_pending().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publish_requires_approval_and_known_targets() {
        let (pipeline, _github, _dir) = pipeline_with(FakeProviderFactory::replying("ok"));
        let (task, _) = pipeline.storage().insert_task(&NewTask::default()).unwrap();
        let err = pipeline
            .publish(PublishRequest {
                article_id: task.task_id,
                targets: Vec::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let article_id = approved(&pipeline);
        let err = pipeline
            .publish(PublishRequest {
                article_id,
                targets: vec!["nowhere".to_string()],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
