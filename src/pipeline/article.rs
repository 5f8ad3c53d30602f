use crate::error::{Error, Result};
use crate::llm::prompts::{article_prompt, revision_prompt, WRITER_SYSTEM_PROMPT};
use crate::llm::CompletionRequest;
use crate::models::analysis::ModelOverride;
use crate::models::prompt::PromptScene;
use crate::models::task::{
    ArticleTask, CreateTaskRequest, EnqueueRequest, LatestArticle, NewTask, RegenerateRequest,
    SaveArticleRequest, TaskLog, TaskStatus,
};
use crate::pipeline::Pipeline;

impl Pipeline {
    /// Queues a generation task. A repeated idempotency key returns the task
    /// created by the first call instead of queueing another.
    pub fn create_task(
        &self,
        request: CreateTaskRequest,
        idempotency_key: Option<String>,
    ) -> Result<ArticleTask> {
        let mut repo_name = request
            .repo_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        if let Some(id) = request.analysis_id {
            let analysis = self
                .storage
                .get_analysis(id)?
                .ok_or_else(|| Error::NotFound(format!("analysis {}", id)))?;
            repo_name = Some(analysis.repo_full_name);
        }
        if let Some(id) = request.pull_record_id {
            let record = self
                .storage
                .get_record(id)?
                .ok_or_else(|| Error::NotFound(format!("pull record {}", id)))?;
            repo_name.get_or_insert(record.full_name);
        }
        if repo_name.is_none() {
            return Err(Error::Validation(
                "analysis_id, pull_record_id or repo_name is required".to_string(),
            ));
        }
        if let Some(id) = request.prompt_id {
            self.article_template(id)?;
        }

        let (task, created) = self.storage.insert_task(&NewTask {
            repo_name,
            analysis_id: request.analysis_id,
            pull_record_id: request.pull_record_id,
            prompt_id: request.prompt_id,
            idempotency_key: idempotency_key.filter(|k| !k.trim().is_empty()),
            ..NewTask::default()
        })?;

        if created {
            tracing::info!("Queued task {} for {:?}", task.task_id, task.repo_name);
            self.submit(task.task_id.clone());
        } else {
            tracing::info!("Idempotent replay of task {}", task.task_id);
        }
        Ok(task)
    }

    /// Queues a task from a loose reference: a numeric pull record id or a
    /// repository full name.
    pub fn enqueue(&self, request: EnqueueRequest, idempotency_key: Option<String>) -> Result<ArticleTask> {
        let input = request
            .input_ref
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| Error::Validation("input_ref is required".to_string()))?;

        let create = match input.parse::<i64>() {
            Ok(id) => CreateTaskRequest {
                pull_record_id: Some(id),
                prompt_id: request.prompt_id,
                ..CreateTaskRequest::default()
            },
            Err(_) => CreateTaskRequest {
                repo_name: Some(input.to_string()),
                prompt_id: request.prompt_id,
                ..CreateTaskRequest::default()
            },
        };
        self.create_task(create, idempotency_key)
    }

    pub fn tasks(&self) -> Result<Vec<ArticleTask>> {
        self.storage.list_tasks()
    }

    pub fn task(&self, task_id: &str) -> Result<ArticleTask> {
        self.storage
            .get_task(task_id)?
            .ok_or_else(|| Error::NotFound(format!("task {}", task_id)))
    }

    pub fn task_logs(&self, task_id: &str) -> Result<TaskLog> {
        let task = self.task(task_id)?;
        Ok(TaskLog {
            log: self.storage.task_log(task_id)?,
            task_id: task.task_id,
            status: task.status,
        })
    }

    /// Queues a revision of a finished draft as a new task.
    pub fn regenerate(&self, request: RegenerateRequest) -> Result<ArticleTask> {
        let suggestions = request.suggestions.trim();
        if suggestions.is_empty() {
            return Err(Error::Validation("suggestions must not be empty".to_string()));
        }

        let source = match request.task_id.as_deref() {
            Some(task_id) => self.task(task_id)?,
            None => self
                .storage
                .latest_article()?
                .ok_or_else(|| Error::NotFound("no article to regenerate".to_string()))?,
        };
        if source.status != TaskStatus::Succeeded {
            return Err(Error::Conflict(format!(
                "task {} is {}, only succeeded drafts can be regenerated",
                source.task_id, source.status
            )));
        }

        let (task, _) = self.storage.insert_task(&NewTask {
            repo_name: source.repo_name.clone(),
            analysis_id: source.analysis_id,
            pull_record_id: source.pull_record_id,
            prompt_id: source.prompt_id,
            parent_task_id: Some(source.task_id.clone()),
            suggestions: Some(suggestions.to_string()),
            seed_content: source.content.clone(),
            idempotency_key: None,
        })?;
        tracing::info!("Queued revision {} of {}", task.task_id, source.task_id);
        self.submit(task.task_id.clone());
        Ok(task)
    }

    pub fn latest_article(&self) -> Result<LatestArticle> {
        let task = self
            .storage
            .latest_article()?
            .ok_or_else(|| Error::NotFound("no article generated yet".to_string()))?;
        Ok(LatestArticle {
            title: task.title(),
            updated_at: task.finished_at.unwrap_or(task.created_at),
            content: task.content.unwrap_or_default(),
            task_id: task.task_id,
            repo_name: task.repo_name,
            status: task.status,
        })
    }

    /// Replaces the draft of a finished, not yet audited task. Without a task
    /// id the latest draft is edited.
    pub fn save_article(&self, request: SaveArticleRequest) -> Result<ArticleTask> {
        if request.content.trim().is_empty() {
            return Err(Error::Validation("content must not be empty".to_string()));
        }
        let task_id = match request.task_id {
            Some(task_id) => task_id,
            None => {
                self.storage
                    .latest_article()?
                    .ok_or_else(|| Error::NotFound("no article to save".to_string()))?
                    .task_id
            }
        };
        self.storage.update_task_content(&task_id, &request.content)
    }

    /// Hands a queued task to the worker pool.
    pub(crate) fn submit(&self, task_id: String) {
        let pipeline = self.clone();
        tokio::spawn(async move {
            let Ok(_permit) = pipeline.workers.clone().acquire_owned().await else {
                return;
            };
            pipeline.process_task(&task_id).await;
        });
    }

    async fn process_task(&self, task_id: &str) {
        let task = match self
            .storage
            .transition_task(task_id, TaskStatus::Running, None, None)
        {
            Ok(task) => task,
            Err(e) => {
                tracing::debug!("Task {} not started: {}", task_id, e);
                return;
            }
        };
        tracing::info!("Task {} running", task_id);

        let outcome = match self.generate(&task).await {
            Ok(content) => {
                self.log(task_id, &format!("draft stored ({} characters)", content.chars().count()));
                self.storage
                    .transition_task(task_id, TaskStatus::Succeeded, Some(&content), None)
            }
            Err(e) => {
                tracing::warn!("Task {} failed: {}", task_id, e);
                self.log(task_id, &format!("failed: {}", e));
                self.storage
                    .transition_task(task_id, TaskStatus::Failed, None, Some(&e.to_string()))
            }
        };

        match outcome {
            Ok(task) => tracing::info!("Task {} {}", task_id, task.status),
            Err(e) => tracing::error!("Could not finish task {}: {}", task_id, e),
        }
    }

    async fn generate(&self, task: &ArticleTask) -> Result<String> {
        let name = task.repo_name.clone().unwrap_or_default();

        self.log(&task.task_id, "step 1/4: resolving repository detail");
        let (detail, source) = self.resolve_detail(task).await?;
        self.log(&task.task_id, &format!("using {} for {}", source, name));

        self.log(&task.task_id, "step 2/4: building prompt");
        let seed = self.storage.task_seed(&task.task_id)?;
        let prompt = match (seed, task.suggestions.as_deref()) {
            (Some(previous), Some(suggestions)) => {
                self.log(&task.task_id, "revising previous draft with suggestions");
                revision_prompt(&previous, suggestions, &detail)
            }
            _ => {
                let template = match task.prompt_id {
                    Some(id) => self.article_template(id)?,
                    None => self.scene_template(PromptScene::ArticleGeneration)?,
                };
                article_prompt(&template, &name, &detail)
            }
        };

        self.log(&task.task_id, "step 3/4: calling model");
        let (provider, config) = self.model(&ModelOverride::default())?;
        self.log(
            &task.task_id,
            &format!("model {} / {}", provider.name(), provider.model()),
        );
        let request =
            CompletionRequest::new(prompt, config.max_tokens).with_system(WRITER_SYSTEM_PROMPT);
        let content = provider.complete(request).await?;
        let content = content.trim().to_string();
        if content.is_empty() {
            return Err(Error::LLMApi("model returned an empty article".to_string()));
        }

        self.log(&task.task_id, "step 4/4: storing draft");
        Ok(content)
    }

    /// Best available description of the task's repository, with a label
    /// naming where it came from.
    async fn resolve_detail(&self, task: &ArticleTask) -> Result<(String, &'static str)> {
        let analysis = match task.analysis_id {
            Some(id) => self.storage.get_analysis(id)?,
            None => match &task.repo_name {
                Some(name) => self.storage.latest_analysis_for(name)?,
                None => None,
            },
        };
        if let Some(analysis) = analysis {
            return Ok((analysis.findings.to_detail(), "analysis findings"));
        }

        let record = match (task.pull_record_id, &task.repo_name) {
            (Some(id), _) => self.storage.get_record(id)?,
            (None, Some(name)) => self.storage.get_record_by_name(name)?,
            (None, None) => None,
        };
        if let Some(record) = record {
            if let Some(detail) = record.detail.filter(|d| !d.trim().is_empty()) {
                return Ok((detail, "record detail"));
            }
            if let Some(summary) = record.summary.filter(|s| !s.trim().is_empty()) {
                return Ok((summary, "record summary"));
            }
            if let Some(path) = &record.readme_path {
                if let Ok(readme) = tokio::fs::read_to_string(path).await {
                    return Ok((readme, "cached README"));
                }
            }
        }

        Err(Error::Validation(format!(
            "no analysis, detail or README found for {}",
            task.repo_name.as_deref().unwrap_or("this task")
        )))
    }

    fn log(&self, task_id: &str, line: &str) {
        if let Err(e) = self.storage.append_task_log(task_id, line) {
            tracing::warn!("Could not append to log of {}: {}", task_id, e);
        }
    }
}
