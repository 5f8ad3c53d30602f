use serde_json::Value;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::llm::{CompletionRequest, EffectiveModelConfig, ProviderFactory};
use crate::models::analysis::ModelOverride;
use crate::models::pull::PullConfig;
use crate::models::settings::{ConfigDocument, ConfigKind, ModelConfig, PublishConfig, TestOutcome};
use crate::pipeline::publisher::PublisherFactory;
use crate::storage::Storage;

/// Typed access to the singleton configuration documents.
pub struct ConfigRegistry {
    storage: Arc<Storage>,
    providers: Arc<dyn ProviderFactory>,
    publishers: Arc<dyn PublisherFactory>,
}

fn from_value<T: ConfigDocument>(value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::Validation(format!("invalid {} config: {}", T::KIND, e)))
}

impl ConfigRegistry {
    pub fn new(
        storage: Arc<Storage>,
        providers: Arc<dyn ProviderFactory>,
        publishers: Arc<dyn PublisherFactory>,
    ) -> Self {
        Self {
            storage,
            providers,
            publishers,
        }
    }

    /// The saved document, or its default when nothing was saved yet.
    pub fn load<T: ConfigDocument>(&self) -> Result<T> {
        match self.storage.load_setting(T::KIND)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(T::default()),
        }
    }

    /// Validates and stores `doc`, replacing the previous document entirely.
    pub fn store<T: ConfigDocument>(&self, mut doc: T) -> Result<T> {
        doc.normalize()?;
        doc.touch();
        self.storage
            .store_setting(T::KIND, &serde_json::to_string(&doc)?)?;
        tracing::info!("Saved {} config", T::KIND);
        Ok(doc)
    }

    pub fn get(&self, kind: ConfigKind) -> Result<Value> {
        Ok(match kind {
            ConfigKind::Model => serde_json::to_value(self.load::<ModelConfig>()?)?,
            ConfigKind::Pull => serde_json::to_value(self.load::<PullConfig>()?)?,
            ConfigKind::Publish => serde_json::to_value(self.load::<PublishConfig>()?)?,
        })
    }

    pub fn save(&self, kind: ConfigKind, value: Value) -> Result<Value> {
        Ok(match kind {
            ConfigKind::Model => serde_json::to_value(self.store(from_value::<ModelConfig>(value)?)?)?,
            ConfigKind::Pull => serde_json::to_value(self.store(from_value::<PullConfig>(value)?)?)?,
            ConfigKind::Publish => {
                serde_json::to_value(self.store(from_value::<PublishConfig>(value)?)?)?
            }
        })
    }

    /// Live check of a candidate document. Nothing is persisted. A rejected
    /// check is an `Ok` outcome with `ok: false`; only a malformed document
    /// is an error.
    pub async fn test(&self, kind: ConfigKind, value: Value) -> Result<TestOutcome> {
        match kind {
            ConfigKind::Model => {
                let mut config = from_value::<ModelConfig>(value)?;
                config.normalize()?;
                Ok(self.test_model(&config).await)
            }
            ConfigKind::Pull => {
                let mut config = from_value::<PullConfig>(value)?;
                config.normalize()?;
                Ok(TestOutcome::passed(format!(
                    "{} keyword(s), batch of {}",
                    config.keywords.len(),
                    config.batch
                )))
            }
            ConfigKind::Publish => {
                let mut config = from_value::<PublishConfig>(value)?;
                config.normalize()?;
                Ok(self.test_publish(&config).await)
            }
        }
    }

    async fn test_model(&self, config: &ModelConfig) -> TestOutcome {
        let effective = match EffectiveModelConfig::resolve(config, &ModelOverride::default()) {
            Ok(effective) => effective,
            Err(e) => return TestOutcome::failed(e.to_string()),
        };
        let provider = match self.providers.build(&effective) {
            Ok(provider) => provider,
            Err(e) => return TestOutcome::failed(e.to_string()),
        };

        let request = CompletionRequest::new("Reply with the single word: ok", 16);
        match provider.complete(request).await {
            Ok(reply) => TestOutcome {
                ok: true,
                message: format!("{} / {} answered", provider.name(), provider.model()),
                reply: Some(reply),
            },
            Err(e) => {
                tracing::warn!("Model config test failed: {}", e);
                TestOutcome::failed(e.to_string())
            }
        }
    }

    async fn test_publish(&self, config: &PublishConfig) -> TestOutcome {
        if config.targets.is_empty() {
            return TestOutcome::failed("no publish targets configured");
        }
        let mut notes = Vec::with_capacity(config.targets.len());
        for target in &config.targets {
            let checked = match self.publishers.build(target) {
                Ok(publisher) => publisher.check().await,
                Err(e) => Err(e),
            };
            match checked {
                Ok(note) => notes.push(format!("{}: {}", target.name, note)),
                Err(e) => return TestOutcome::failed(format!("{}: {}", target.name, e)),
            }
        }
        TestOutcome::passed(notes.join("; "))
    }
}
