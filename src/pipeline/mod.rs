//! The content pipeline: pull, analysis, generation, audit and publish
//! stages sharing one store, one config registry and one worker pool, plus
//! the scheduler that runs the saved pull and publish schedules.

pub mod analysis;
pub mod article;
pub mod audit;
pub mod prompts;
pub mod publish;
pub mod publisher;
pub mod pull;
pub mod repos;
pub mod scheduler;

use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::Config;
use crate::error::Result;
use crate::github::{GitHubClient, RepoSource, SimulatedSource};
use crate::llm::{EffectiveModelConfig, HttpProviderFactory, LLMProvider, ProviderFactory};
use crate::models::analysis::ModelOverride;
use crate::models::settings::ModelConfig;
use crate::settings::ConfigRegistry;
use crate::storage::Storage;

pub use publisher::{
    DefaultPublisherFactory, LocalPublisher, Publisher, PublisherFactory, WebhookPublisher,
    WechatPublisher,
};
pub use scheduler::{Schedule, ScheduledRun};

/// Link prefix under which the local publish target's files are served.
pub const FILES_LINK_PREFIX: &str = "/api/files";

#[derive(Clone)]
pub struct Pipeline {
    storage: Arc<Storage>,
    registry: Arc<ConfigRegistry>,
    github: Arc<dyn RepoSource>,
    simulated: Arc<dyn RepoSource>,
    providers: Arc<dyn ProviderFactory>,
    publishers: Arc<dyn PublisherFactory>,
    workers: Arc<Semaphore>,
    config: Arc<Config>,
}

impl Pipeline {
    pub fn new(
        config: Config,
        storage: Arc<Storage>,
        github: Arc<dyn RepoSource>,
        providers: Arc<dyn ProviderFactory>,
        publishers: Arc<dyn PublisherFactory>,
    ) -> Self {
        let registry = ConfigRegistry::new(storage.clone(), providers.clone(), publishers.clone());
        Self {
            storage,
            registry: Arc::new(registry),
            github,
            simulated: Arc::new(SimulatedSource),
            providers,
            publishers,
            workers: Arc::new(Semaphore::new(config.worker_concurrency.max(1))),
            config: Arc::new(config),
        }
    }

    /// Wires the production stack: SQLite at `database_path`, GitHub, HTTP
    /// model providers and the configured publish targets.
    pub fn from_config(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::new(&config.database_path)?);
        let github = GitHubClient::new(config.github_token.as_deref(), config.request_timeout)?;
        let providers = HttpProviderFactory::new(config.llm_timeout);
        let publishers = DefaultPublisherFactory::new(
            config.published_dir(),
            FILES_LINK_PREFIX,
            config.request_timeout,
        );
        Ok(Self::new(
            config,
            storage,
            Arc::new(github),
            Arc::new(providers),
            Arc::new(publishers),
        ))
    }

    pub fn with_simulated_source(mut self, source: Arc<dyn RepoSource>) -> Self {
        self.simulated = source;
        self
    }

    /// Seeds the built-in prompts and hands queued tasks left by a previous
    /// process back to the workers.
    pub fn start(&self) -> Result<()> {
        let seeded = self.seed_prompts()?;
        if seeded > 0 {
            tracing::info!("Seeded {} built-in prompt templates", seeded);
        }
        let queued = self.storage.recover_tasks()?;
        if !queued.is_empty() {
            tracing::info!("Resuming {} queued generation tasks", queued.len());
        }
        for task_id in queued {
            self.submit(task_id);
        }
        Ok(())
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn registry(&self) -> &ConfigRegistry {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn source_for(&self, simulate: bool) -> Arc<dyn RepoSource> {
        if simulate {
            self.simulated.clone()
        } else {
            self.github.clone()
        }
    }

    /// Provider for the saved model config with `overrides` applied.
    fn model(&self, overrides: &ModelOverride) -> Result<(Arc<dyn LLMProvider>, EffectiveModelConfig)> {
        let saved: ModelConfig = self.registry.load()?;
        let effective = EffectiveModelConfig::resolve(&saved, overrides)?;
        let provider = self.providers.build(&effective)?;
        Ok((provider, effective))
    }
}
