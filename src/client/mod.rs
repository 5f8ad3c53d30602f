//! Typed HTTP client for the repopress API.

pub mod error;

use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::models::analysis::{AnalysisResult, AnalyzeRequest};
use crate::models::prompt::{PromptScene, PromptTemplate, SavePromptRequest, SetDefaultRequest};
use crate::models::publish::{PendingArticle, PublishLink, PublishRecord, PublishReport, PublishRequest};
use crate::models::pull::{
    PullByConfigRequest, PullConfig, PullRunRequest, PullRunResult, PullTestResult,
    ReanalyzeResult,
};
use crate::models::repo::{Page, RePullRequest, RecordQuery, RecordView, RepoRecord, RepoStats, ReposQuery};
use crate::models::review::{AuditRequest, ReviewDecision};
use crate::models::settings::{ModelConfig, PublishConfig, TestOutcome};
use crate::models::task::{
    ArticleTask, CreateTaskRequest, EnqueueRequest, LatestArticle, RegenerateRequest,
    SaveArticleRequest, TaskLog,
};
use crate::server::response::ApiResponse;
use crate::server::routes::article::IDEMPOTENCY_HEADER;
use crate::server::routes::pull::DeduplicateResult;
use crate::server::routes::repos::Health;

pub use error::{ClientError, ClientResult};

pub struct ApiClient {
    client: Client,
    base_url: String,
    base: Url,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let base = Url::parse(&base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url));
        }
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url,
            base,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// URL under the base with each segment percent-encoded.
    fn segment_url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<T> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let (kind, message) = match serde_json::from_str::<ApiResponse<Value>>(&body) {
                Ok(envelope) => (
                    envelope
                        .error_kind
                        .unwrap_or_else(|| error::kind_for_status(status)),
                    envelope.message.unwrap_or_else(|| status.to_string()),
                ),
                Err(_) => (error::kind_for_status(status), body),
            };
            return Err(ClientError::Remote {
                status: status.as_u16(),
                kind,
                message,
            });
        }

        let envelope: ApiResponse<T> =
            serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))?;
        envelope
            .data
            .ok_or_else(|| ClientError::Decode("response carried no data".to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        tracing::debug!("GET {}", path);
        self.send(self.client.get(self.url(path))).await
    }

    async fn get_query<Q: Serialize, T: DeserializeOwned>(&self, path: &str, query: &Q) -> ClientResult<T> {
        tracing::debug!("GET {}", path);
        self.send(self.client.get(self.url(path)).query(query)).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> ClientResult<T> {
        tracing::debug!("POST {}", path);
        self.send(self.client.post(self.url(path)).json(body)).await
    }

    async fn post_idempotent<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        idempotency_key: Option<&str>,
    ) -> ClientResult<T> {
        tracing::debug!("POST {}", path);
        let mut request = self.client.post(self.url(path)).json(body);
        if let Some(key) = idempotency_key {
            request = request.header(IDEMPOTENCY_HEADER, key);
        }
        self.send(request).await
    }

    pub async fn health(&self) -> ClientResult<Health> {
        self.get("/health").await
    }

    pub async fn repos(&self, query: &ReposQuery) -> ClientResult<Vec<RepoRecord>> {
        self.get_query("/repos", query).await
    }

    pub async fn stats(&self) -> ClientResult<RepoStats> {
        self.get("/stats").await
    }

    pub async fn readme(&self, path: &str) -> ClientResult<String> {
        self.get_query("/repo/readme", &[("path", path)]).await
    }

    pub async fn analyze(&self, request: &AnalyzeRequest) -> ClientResult<AnalysisResult> {
        self.post("/analyze", request).await
    }

    pub async fn pull_run(&self, request: &PullRunRequest) -> ClientResult<PullRunResult> {
        self.post("/pull/run", request).await
    }

    pub async fn pull_run_by_config(&self, overrides: &PullByConfigRequest) -> ClientResult<PullRunResult> {
        self.post("/pull/run/config", overrides).await
    }

    pub async fn pull_records(&self, query: &RecordQuery) -> ClientResult<Page<RecordView>> {
        self.get_query("/pull/records", query).await
    }

    pub async fn re_pull(&self, request: &RePullRequest) -> ClientResult<RepoRecord> {
        self.post("/pull/repull", request).await
    }

    pub async fn pull_config(&self) -> ClientResult<PullConfig> {
        self.get("/pull/config").await
    }

    pub async fn save_pull_config(&self, config: &PullConfig) -> ClientResult<PullConfig> {
        self.post("/pull/config", config).await
    }

    /// Previews a candidate pull config; `Value::Null` previews the saved one.
    pub async fn pull_test(&self, candidate: &Value) -> ClientResult<PullTestResult> {
        self.post("/pull/test", candidate).await
    }

    pub async fn deduplicate(&self) -> ClientResult<usize> {
        tracing::debug!("POST /pull/deduplicate");
        let result: DeduplicateResult = self
            .send(self.client.post(self.url("/pull/deduplicate")))
            .await?;
        Ok(result.removed)
    }

    pub async fn reanalyze_all(&self) -> ClientResult<ReanalyzeResult> {
        tracing::debug!("POST /pull/reanalyze_all");
        self.send(self.client.post(self.url("/pull/reanalyze_all")))
            .await
    }

    pub async fn create_task(
        &self,
        request: &CreateTaskRequest,
        idempotency_key: Option<&str>,
    ) -> ClientResult<ArticleTask> {
        self.post_idempotent("/article/create_task", request, idempotency_key)
            .await
    }

    pub async fn enqueue(
        &self,
        request: &EnqueueRequest,
        idempotency_key: Option<&str>,
    ) -> ClientResult<ArticleTask> {
        self.post_idempotent("/make/enqueue", request, idempotency_key)
            .await
    }

    pub async fn tasks(&self) -> ClientResult<Vec<ArticleTask>> {
        self.get("/make/tasks").await
    }

    pub async fn task_logs(&self, task_id: &str) -> ClientResult<TaskLog> {
        tracing::debug!("GET /make/logs/{}", task_id);
        self.send(self.client.get(self.segment_url(&["make", "logs", task_id])))
            .await
    }

    pub async fn latest_article(&self) -> ClientResult<LatestArticle> {
        self.get("/article/latest").await
    }

    pub async fn save_article(&self, request: &SaveArticleRequest) -> ClientResult<ArticleTask> {
        self.post("/article/save", request).await
    }

    pub async fn regenerate(&self, request: &RegenerateRequest) -> ClientResult<ArticleTask> {
        self.post("/article/regenerate", request).await
    }

    pub async fn pending_review(&self) -> ClientResult<Vec<ArticleTask>> {
        self.get("/article/tasks/pending_review").await
    }

    pub async fn audit(&self, request: &AuditRequest) -> ClientResult<ReviewDecision> {
        self.post("/article/audit", request).await
    }

    pub async fn model_config(&self) -> ClientResult<ModelConfig> {
        self.get("/config/model").await
    }

    pub async fn save_model_config(&self, config: &ModelConfig) -> ClientResult<ModelConfig> {
        self.post("/config/model", config).await
    }

    pub async fn test_model_config(&self, config: &ModelConfig) -> ClientResult<TestOutcome> {
        self.post("/config/model/test", config).await
    }

    pub async fn publish_config(&self) -> ClientResult<PublishConfig> {
        self.get("/publish/config").await
    }

    pub async fn save_publish_config(&self, config: &PublishConfig) -> ClientResult<PublishConfig> {
        self.post("/publish/config", config).await
    }

    pub async fn test_publish_config(&self, config: &PublishConfig) -> ClientResult<TestOutcome> {
        self.post("/publish/test", config).await
    }

    pub async fn publish_pending(&self) -> ClientResult<Vec<PendingArticle>> {
        self.get("/publish/pending").await
    }

    pub async fn publish(&self, request: &PublishRequest) -> ClientResult<PublishReport> {
        self.post("/publish", request).await
    }

    pub async fn publish_history(&self) -> ClientResult<Vec<PublishRecord>> {
        self.get("/publish/history").await
    }

    pub async fn publish_links(&self) -> ClientResult<Vec<PublishLink>> {
        self.get("/publish/links").await
    }

    pub async fn prompts(&self, scene: Option<PromptScene>) -> ClientResult<Vec<PromptTemplate>> {
        match scene {
            Some(scene) => self.get_query("/prompts", &[("scene", scene.as_str())]).await,
            None => self.get("/prompts").await,
        }
    }

    pub async fn save_prompt(&self, request: &SavePromptRequest) -> ClientResult<PromptTemplate> {
        self.post("/prompts", request).await
    }

    pub async fn set_default_prompt(&self, id: i64) -> ClientResult<PromptTemplate> {
        self.post("/prompts/default", &SetDefaultRequest { id }).await
    }

    pub async fn delete_prompt(&self, id: i64) -> ClientResult<PromptTemplate> {
        tracing::debug!("DELETE /prompts/{}", id);
        let id = id.to_string();
        self.send(self.client.delete(self.segment_url(&["prompts", &id])))
            .await
    }

    /// Polls a task every `interval` until it is terminal or `max_polls`
    /// polls were made. Returns the last log seen either way.
    pub async fn poll_task(&self, task_id: &str, interval: Duration, max_polls: u32) -> ClientResult<TaskLog> {
        self.poll_task_with(task_id, interval, max_polls, |_| {}).await
    }

    /// Like [`ApiClient::poll_task`], calling `on_poll` after every poll.
    pub async fn poll_task_with<F>(
        &self,
        task_id: &str,
        interval: Duration,
        max_polls: u32,
        mut on_poll: F,
    ) -> ClientResult<TaskLog>
    where
        F: FnMut(&TaskLog),
    {
        let max_polls = max_polls.max(1);
        let mut poll = 1;
        loop {
            let log = self.task_logs(task_id).await?;
            on_poll(&log);
            if log.status.is_terminal() || poll >= max_polls {
                return Ok(log);
            }
            poll += 1;
            tokio::time::sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn client(base_url: &str) -> ApiClient {
        ApiClient::new(&ClientConfig {
            base_url: base_url.to_string(),
            timeout: Duration::from_secs(1),
        })
        .unwrap()
    }

    #[test]
    fn test_path_segments_are_encoded() {
        let client = client("http://127.0.0.1:5001/api/");
        let url = client.segment_url(&["make", "logs", "../a b?c"]);
        assert_eq!(url.as_str(), "http://127.0.0.1:5001/api/make/logs/..%2Fa%20b%3Fc");
    }

    #[test]
    fn test_invalid_base_url() {
        let result = ApiClient::new(&ClientConfig {
            base_url: "not a url".to_string(),
            timeout: Duration::from_secs(1),
        });
        assert!(matches!(result, Err(ClientError::InvalidUrl(_))));
    }
}
