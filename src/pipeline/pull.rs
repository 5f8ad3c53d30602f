use futures::future::join_all;
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::llm::prompts::{
    plain_summary, render, truncate_chars, ANALYST_SYSTEM_PROMPT, README_LIMIT, SUMMARY_INPUT_LIMIT,
};
use crate::llm::{CompletionRequest, LLMProvider};
use crate::models::analysis::ModelOverride;
use crate::models::prompt::PromptScene;
use crate::models::pull::{
    PullByConfigRequest, PullConfig, PullPlan, PullRunRequest, PullRunResult, PullTestResult,
    ReanalyzeResult, SortKey,
};
use crate::models::repo::{
    split_full_name, DiscoveredRepo, Page, RePullRequest, RecordQuery, RecordStatus, RecordView,
    RepoRecord,
};
use crate::models::settings::ConfigDocument;
use crate::pipeline::Pipeline;

const PREVIEW_LIMIT: u32 = 5;
const SUMMARY_MAX_TOKENS: u32 = 256;

/// Orders merged multi-keyword results by the sort key. Keys GitHub ranks
/// server-side keep discovery order.
fn sort_repos(repos: &mut [DiscoveredRepo], sort: SortKey) {
    match sort {
        SortKey::Stars => repos.sort_by(|a, b| b.stars.cmp(&a.stars)),
        SortKey::Forks => repos.sort_by(|a, b| b.forks.cmp(&a.forks)),
        SortKey::Updated | SortKey::HelpWantedIssues | SortKey::BestMatch => {}
    }
}

impl Pipeline {
    pub async fn pull_run(&self, request: PullRunRequest) -> Result<PullRunResult> {
        let plan = PullPlan::from_request(request)?;
        self.execute_pull(plan).await
    }

    /// Runs the saved pull config. Keywords and `simulate` may be overridden
    /// for this run only.
    pub async fn pull_run_by_config(&self, overrides: PullByConfigRequest) -> Result<PullRunResult> {
        let config: PullConfig = self.registry.load()?;
        let plan = PullPlan::from_config(&config, overrides)?;
        self.execute_pull(plan).await
    }

    async fn discover(&self, plan: &PullPlan) -> Result<Vec<DiscoveredRepo>> {
        let source = self.source_for(plan.simulate);
        let mut seen = HashSet::new();
        let mut merged = Vec::new();

        for keyword in &plan.keywords {
            tracing::info!(
                "Searching {} for '{}' (sort: {}, limit: {})",
                source.name(),
                keyword,
                plan.sort.as_str(),
                plan.limit
            );
            let found = source.search(keyword, plan.sort, plan.limit).await?;
            for repo in found {
                if seen.insert(repo.url.to_lowercase()) {
                    merged.push(repo);
                }
            }
        }

        if plan.keywords.len() > 1 {
            sort_repos(&mut merged, plan.sort);
        }
        merged.truncate(plan.limit as usize);
        Ok(merged)
    }

    async fn execute_pull(&self, plan: PullPlan) -> Result<PullRunResult> {
        let (result, _ingest) = self.start_pull(plan).await?;
        Ok(result)
    }

    /// Discovers and stores repositories. The handle, when present, resolves
    /// once the background README ingest has finished.
    pub(crate) async fn start_pull(
        &self,
        plan: PullPlan,
    ) -> Result<(PullRunResult, Option<JoinHandle<usize>>)> {
        let repos = self.discover(&plan).await?;
        let persisted = !plan.simulate || self.config.persist_simulated_pulls;

        let mut stored = Vec::new();
        if persisted {
            let status = if plan.simulate {
                RecordStatus::Simulated
            } else {
                RecordStatus::Pending
            };
            for repo in &repos {
                stored.push(self.storage.upsert_record(
                    repo,
                    Some(plan.sort.as_str()),
                    plan.task_id.as_deref(),
                    status,
                )?);
            }
        }

        let ingesting = !plan.simulate && !stored.is_empty();
        let ingest = ingesting
            .then(|| self.spawn_ingest(stored, plan.concurrency, plan.per_project_delay_secs));

        tracing::info!(
            "Pull run found {} repositories (simulated: {}, persisted: {})",
            repos.len(),
            plan.simulate,
            persisted
        );

        let result = PullRunResult {
            count: repos.len(),
            keywords: plan.keywords,
            sort: plan.sort,
            simulated: plan.simulate,
            persisted,
            status: if ingesting { "ingesting" } else { "completed" }.to_string(),
            repos,
        };
        Ok((result, ingest))
    }

    /// Re-fetches a stored repository and refreshes its row.
    pub async fn re_pull(&self, request: RePullRequest) -> Result<RepoRecord> {
        let name = request
            .full_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());
        let existing = match (request.id, name) {
            (Some(id), _) => self
                .storage
                .get_record(id)?
                .ok_or_else(|| Error::NotFound(format!("pull record {}", id)))?,
            (None, Some(name)) => self
                .storage
                .get_record_by_name(name)?
                .ok_or_else(|| Error::NotFound(format!("pull record {}", name)))?,
            (None, None) => {
                return Err(Error::Validation("id or full_name is required".to_string()))
            }
        };

        let simulated = existing.status == RecordStatus::Simulated;
        let repo = self
            .source_for(simulated)
            .repository(&existing.full_name)
            .await?;
        let status = if simulated {
            RecordStatus::Simulated
        } else {
            RecordStatus::Pending
        };
        let record = self.storage.upsert_record(
            &repo,
            existing.rule.as_deref(),
            existing.pull_task_id.as_deref(),
            status,
        )?;
        tracing::info!("Re-pulled {}", record.full_name);

        if !simulated {
            self.spawn_ingest(vec![record.clone()], 1, 0);
        }
        Ok(record)
    }

    pub fn records(&self, query: &RecordQuery) -> Result<Page<RecordView>> {
        self.storage.list_records(query)
    }

    /// Previews a pull config without storing anything. An empty body tests
    /// the saved config.
    pub async fn pull_test(&self, candidate: Value) -> Result<PullTestResult> {
        let mut config: PullConfig = match candidate {
            Value::Null => self.registry.load()?,
            Value::Object(ref map) if map.is_empty() => self.registry.load()?,
            value => serde_json::from_value(value)
                .map_err(|e| Error::Validation(format!("invalid pull config: {}", e)))?,
        };
        config.normalize()?;

        let sort = config.rule.sort_key();
        let keyword = config
            .keywords
            .first()
            .cloned()
            .ok_or_else(|| Error::Validation("at least one keyword is required".to_string()))?;
        let preview = self
            .source_for(config.simulate)
            .search(&keyword, sort, config.batch.min(PREVIEW_LIMIT))
            .await?;

        Ok(PullTestResult {
            config,
            sort,
            preview,
        })
    }

    pub fn deduplicate(&self) -> Result<usize> {
        let removed = self.storage.deduplicate_records()?;
        tracing::info!("Removed {} duplicate pull records", removed);
        Ok(removed)
    }

    pub fn spawn_ingest(
        &self,
        records: Vec<RepoRecord>,
        concurrency: u32,
        delay_secs: u64,
    ) -> JoinHandle<usize> {
        let pipeline = self.clone();
        tokio::spawn(async move { pipeline.ingest_records(records, concurrency, delay_secs).await })
    }

    /// Fetches, caches and describes each record's README. Returns how many
    /// records ended up fetched.
    pub async fn ingest_records(
        &self,
        records: Vec<RepoRecord>,
        concurrency: u32,
        delay_secs: u64,
    ) -> usize {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1) as usize));
        let total = records.len();

        let jobs = records.into_iter().map(|record| {
            let sem = semaphore.clone();
            let pipeline = self.clone();
            async move {
                let _permit = sem.acquire().await.ok()?;

                let status = match pipeline.ingest_one(&record).await {
                    Ok(status) => status,
                    Err(e) => {
                        tracing::warn!("Ingest of {} failed: {}", record.full_name, e);
                        if let Err(e) = pipeline.storage.update_record_ingest(
                            record.id,
                            RecordStatus::Failed,
                            None,
                            None,
                            None,
                        ) {
                            tracing::warn!("Could not mark {} as failed: {}", record.full_name, e);
                        }
                        RecordStatus::Failed
                    }
                };

                if delay_secs > 0 {
                    tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                }
                Some(status)
            }
        });

        let fetched = join_all(jobs)
            .await
            .into_iter()
            .flatten()
            .filter(|status| *status == RecordStatus::Fetched)
            .count();
        tracing::info!("Ingested {}/{} repositories", fetched, total);
        fetched
    }

    async fn ingest_one(&self, record: &RepoRecord) -> Result<RecordStatus> {
        let Some(readme) = self.github.readme(&record.full_name).await? else {
            tracing::warn!("{} has no README", record.full_name);
            self.storage
                .update_record_ingest(record.id, RecordStatus::Failed, None, None, None)?;
            return Ok(RecordStatus::Failed);
        };

        let path = self.cache_readme(&record.full_name, &readme).await?;
        let path = path.to_string_lossy();

        let (detail, llm_summary) = self.describe(&record.full_name, &readme).await;
        let summary = llm_summary.unwrap_or_else(|| plain_summary(&readme));

        self.storage.update_record_ingest(
            record.id,
            RecordStatus::Fetched,
            Some(&summary),
            detail.as_deref(),
            Some(&path),
        )?;
        tracing::debug!("Fetched README of {}", record.full_name);
        Ok(RecordStatus::Fetched)
    }

    /// Regenerates detail and summary of every fetched record from its cached
    /// README. Records without a cache, and records the model could not
    /// describe, are left as they are.
    pub async fn reanalyze_all(&self) -> Result<ReanalyzeResult> {
        self.model(&ModelOverride::default())?;
        let config: PullConfig = self.registry.load()?;
        let records = self.storage.records_with_status(RecordStatus::Fetched)?;
        let total = records.len();
        let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1) as usize));

        let jobs = records.into_iter().map(|record| {
            let sem = semaphore.clone();
            let pipeline = self.clone();
            async move {
                let _permit = sem.acquire().await.ok()?;
                match pipeline.reanalyze_one(&record).await {
                    Ok(true) => Some(record.full_name),
                    Ok(false) => None,
                    Err(e) => {
                        tracing::warn!("Re-analysis of {} failed: {}", record.full_name, e);
                        None
                    }
                }
            }
        });

        let repos: Vec<String> = join_all(jobs).await.into_iter().flatten().collect();
        tracing::info!("Re-analyzed {}/{} repositories", repos.len(), total);
        Ok(ReanalyzeResult {
            count: repos.len(),
            repos,
        })
    }

    async fn reanalyze_one(&self, record: &RepoRecord) -> Result<bool> {
        let path = match record.readme_path.as_deref() {
            Some(path) => PathBuf::from(path),
            None => self.readme_cache_path(&record.full_name)?,
        };
        let readme = match tokio::fs::read_to_string(&path).await {
            Ok(readme) => readme,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No cached README for {}", record.full_name);
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        let (detail, llm_summary) = self.describe(&record.full_name, &readme).await;
        let Some(detail) = detail else {
            return Ok(false);
        };
        let summary = llm_summary.unwrap_or_else(|| plain_summary(&readme));
        let path = path.to_string_lossy();
        self.storage.update_record_ingest(
            record.id,
            RecordStatus::Fetched,
            Some(&summary),
            Some(&detail),
            Some(&path),
        )?;
        Ok(true)
    }

    pub(crate) fn readme_cache_path(&self, full_name: &str) -> Result<PathBuf> {
        let (owner, name) = split_full_name(full_name)
            .ok_or_else(|| Error::Validation(format!("invalid repository name '{}'", full_name)))?;
        Ok(self.config.repos_dir().join(owner).join(name).join("README.md"))
    }

    async fn cache_readme(&self, full_name: &str, readme: &str) -> Result<PathBuf> {
        let path = self.readme_cache_path(full_name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, readme.as_bytes()).await?;
        Ok(path)
    }

    /// LLM detail and short summary of a README. Skipped when no model is
    /// configured; a failed call keeps whatever was produced before it.
    async fn describe(&self, full_name: &str, readme: &str) -> (Option<String>, Option<String>) {
        let (provider, config) = match self.model(&ModelOverride::default()) {
            Ok(model) => model,
            Err(e) => {
                tracing::debug!("Skipping model description of {}: {}", full_name, e);
                return (None, None);
            }
        };

        let detail = match self
            .describe_scene(
                provider.as_ref(),
                PromptScene::RepoDetail,
                &[("name", full_name), ("content", truncate_chars(readme, README_LIMIT))],
                config.max_tokens,
            )
            .await
        {
            Ok(detail) => detail,
            Err(e) => {
                tracing::warn!("Detail generation for {} failed: {}", full_name, e);
                return (None, None);
            }
        };

        let summary = self
            .describe_scene(
                provider.as_ref(),
                PromptScene::RepoSummary,
                &[("name", full_name), ("detail", truncate_chars(&detail, SUMMARY_INPUT_LIMIT))],
                SUMMARY_MAX_TOKENS,
            )
            .await
            .map_err(|e| tracing::warn!("Summary generation for {} failed: {}", full_name, e))
            .ok();

        (Some(detail), summary)
    }

    async fn describe_scene(
        &self,
        provider: &dyn LLMProvider,
        scene: PromptScene,
        vars: &[(&str, &str)],
        max_tokens: u32,
    ) -> Result<String> {
        let template = self.scene_template(scene)?;
        let request = CompletionRequest::new(render(&template, vars), max_tokens)
            .with_system(ANALYST_SYSTEM_PROMPT);
        let reply = provider.complete(request).await?;
        Ok(reply.trim().to_string())
    }
}
