//! Offline stand-ins for GitHub, the LLM providers and publish targets.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::github::RepoSource;
use crate::llm::{CompletionRequest, EffectiveModelConfig, LLMProvider, ProviderFactory};
use crate::models::publish::Article;
use crate::models::pull::SortKey;
use crate::models::repo::DiscoveredRepo;
use crate::models::settings::PublishTargetConfig;
use crate::models::task::ArticleTask;
use crate::pipeline::publisher::{Publisher, PublisherFactory};
use crate::pipeline::Pipeline;
use crate::storage::Storage;

/// Repository source that counts every call.
#[derive(Default)]
pub struct CountingSource {
    calls: AtomicUsize,
}

impl CountingSource {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn repo(keyword: &str, index: u32) -> DiscoveredRepo {
        let full_name = format!("octo/{}-{}", keyword.to_lowercase(), index);
        DiscoveredRepo {
            url: format!("https://github.com/{}", full_name),
            description: Some(format!("{} project {}", keyword, index)),
            language: Some("Rust".to_string()),
            stars: 500 - index,
            forks: index,
            full_name,
        }
    }
}

#[async_trait]
impl RepoSource for CountingSource {
    async fn search(&self, keyword: &str, _sort: SortKey, limit: u32) -> Result<Vec<DiscoveredRepo>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((1..=limit).map(|i| Self::repo(keyword, i)).collect())
    }

    async fn repository(&self, full_name: &str) -> Result<DiscoveredRepo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut repo = Self::repo("refetched", 1);
        repo.full_name = full_name.to_string();
        repo.url = format!("https://github.com/{}", full_name);
        repo.stars = 999;
        Ok(repo)
    }

    async fn readme(&self, full_name: &str) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if full_name.ends_with("-missing") {
            return Ok(None);
        }
        Ok(Some(format!(
            "# {}\n\n[![CI](https://img.shields.io/badge)](x)\n\n{} is a small tool that does one thing well.",
            full_name, full_name
        )))
    }

    fn name(&self) -> &str {
        "counting"
    }
}

struct FakeProvider {
    reply: String,
    failure: Option<String>,
    calls: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl LLMProvider for FakeProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request.prompt);
        }
        match &self.failure {
            Some(message) => Err(Error::LLMApi(message.clone())),
            None => Ok(self.reply.clone()),
        }
    }

    fn name(&self) -> &str {
        "fake"
    }

    fn model(&self) -> &str {
        "fake-model"
    }
}

/// Providers that answer with a fixed reply. The key `bad-key` is rejected
/// the way a real provider rejects an invalid key.
#[derive(Clone)]
pub struct FakeProviderFactory {
    reply: String,
    calls: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl FakeProviderFactory {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl ProviderFactory for FakeProviderFactory {
    fn build(&self, config: &EffectiveModelConfig) -> Result<Arc<dyn LLMProvider>> {
        let key = config.api_key()?;
        let failure = (key == "bad-key").then(|| "401 Unauthorized: invalid api key".to_string());
        Ok(Arc::new(FakeProvider {
            reply: self.reply.clone(),
            failure,
            calls: self.calls.clone(),
            prompts: self.prompts.clone(),
        }))
    }
}

struct FakePublisher {
    name: String,
    published: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn publish(&self, article: &Article) -> Result<String> {
        if self.name.starts_with("down") {
            return Err(Error::PublishTarget(format!("{} is unreachable", self.name)));
        }
        if let Ok(mut published) = self.published.lock() {
            published.push((self.name.clone(), article.id.clone()));
        }
        Ok(format!("https://{}.example.com/{}", self.name, article.id))
    }

    async fn check(&self) -> Result<String> {
        if self.name.starts_with("down") {
            return Err(Error::PublishTarget("connection refused".to_string()));
        }
        Ok("reachable".to_string())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Publishers that succeed unless the target name starts with `down`.
#[derive(Clone, Default)]
pub struct FakePublisherFactory {
    published: Arc<Mutex<Vec<(String, String)>>>,
}

impl FakePublisherFactory {
    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl PublisherFactory for FakePublisherFactory {
    fn build(&self, target: &PublishTargetConfig) -> Result<Arc<dyn Publisher>> {
        Ok(Arc::new(FakePublisher {
            name: target.name.clone(),
            published: self.published.clone(),
        }))
    }
}

/// Pipeline over in-memory storage, a [`CountingSource`] in place of GitHub
/// and fake publishers. The data directory lives in the returned temp dir.
pub fn pipeline_with(
    providers: FakeProviderFactory,
) -> (Pipeline, Arc<CountingSource>, tempfile::TempDir) {
    pipeline_with_config(providers, |_| {})
}

pub fn pipeline_with_config(
    providers: FakeProviderFactory,
    adjust: impl FnOnce(&mut Config),
) -> (Pipeline, Arc<CountingSource>, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut config = Config {
        data_dir: dir.path().join("data"),
        ..Config::default()
    };
    adjust(&mut config);

    let github = Arc::new(CountingSource::default());
    let pipeline = Pipeline::new(
        config,
        Arc::new(Storage::in_memory().expect("in-memory storage")),
        github.clone(),
        Arc::new(providers),
        Arc::new(FakePublisherFactory::default()),
    );
    (pipeline, github, dir)
}

/// Polls until the task reaches a terminal status.
pub async fn wait_for_task(pipeline: &Pipeline, task_id: &str) -> ArticleTask {
    for _ in 0..200 {
        let task = pipeline
            .storage()
            .get_task(task_id)
            .expect("task lookup")
            .expect("task exists");
        if task.status.is_terminal() {
            return task;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("task {} did not finish", task_id);
}
