#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use repopress::error::{Error, Result};
use repopress::github::SimulatedSource;
use repopress::llm::{CompletionRequest, EffectiveModelConfig, LLMProvider, ProviderFactory};
use repopress::pipeline::{DefaultPublisherFactory, FILES_LINK_PREFIX};
use repopress::{server, ApiClient, ClientConfig, Config, Pipeline, Storage};
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const ARTICLE: &str = "# A tidy CLI\n\nIt does one thing and does it well.";

/// Provider that answers every prompt with [`ARTICLE`].
#[derive(Clone, Default)]
pub struct EchoProviderFactory {
    calls: Arc<AtomicUsize>,
}

impl EchoProviderFactory {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

struct EchoProvider {
    model: String,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl LLMProvider for EchoProvider {
    async fn complete(&self, _request: CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ARTICLE.to_string())
    }

    fn name(&self) -> &str {
        "echo"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

impl ProviderFactory for EchoProviderFactory {
    fn build(&self, config: &EffectiveModelConfig) -> Result<Arc<dyn LLMProvider>> {
        if config.api_key()? == "bad-key" {
            return Err(Error::LLMApi("401 Unauthorized".to_string()));
        }
        Ok(Arc::new(EchoProvider {
            model: config.model.clone(),
            calls: self.calls.clone(),
        }))
    }
}

pub struct TestApp {
    pub client: ApiClient,
    pub pipeline: Pipeline,
    pub providers: EchoProviderFactory,
    _dir: TempDir,
}

/// Serves a pipeline backed by in-memory storage, the simulated source and
/// a local publish target on an ephemeral port.
pub async fn spawn_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        data_dir: dir.path().join("data"),
        ..Config::default()
    };
    let providers = EchoProviderFactory::default();
    let publishers = DefaultPublisherFactory::new(
        config.published_dir(),
        FILES_LINK_PREFIX,
        Duration::from_secs(5),
    );
    let pipeline = Pipeline::new(
        config,
        Arc::new(Storage::in_memory().unwrap()),
        Arc::new(SimulatedSource),
        Arc::new(providers.clone()),
        Arc::new(publishers),
    );
    pipeline.start().unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve_on(listener, pipeline.clone()));

    let client = ApiClient::new(&ClientConfig {
        base_url: format!("http://{}/api", addr),
        timeout: Duration::from_secs(5),
    })
    .unwrap();

    TestApp {
        client,
        pipeline,
        providers,
        _dir: dir,
    }
}
