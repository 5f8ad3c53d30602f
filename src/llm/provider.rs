use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::llm::claude::ClaudeProvider;
use crate::llm::openai::OpenAiProvider;
use crate::models::analysis::ModelOverride;
use crate::models::settings::{ModelConfig, ProviderKind};

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            max_tokens,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Sends one prompt and returns the text of the reply.
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
    fn name(&self) -> &str;
    fn model(&self) -> &str;
}

/// Model settings for one call: the saved config with call overrides applied.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveModelConfig {
    pub provider: ProviderKind,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
}

impl EffectiveModelConfig {
    /// Overrides win field by field. Switching provider in an override drops
    /// the saved base URL, model and API key, which belong to the saved provider.
    pub fn resolve(saved: &ModelConfig, overrides: &ModelOverride) -> Result<Self> {
        let non_blank = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let provider = match non_blank(&overrides.provider) {
            Some(name) => name.parse::<ProviderKind>()?,
            None => saved.provider,
        };
        let same_provider = provider == saved.provider;

        let base_url = non_blank(&overrides.base_url)
            .or_else(|| same_provider.then(|| saved.base_url.clone()).flatten())
            .unwrap_or_else(|| provider.default_base_url().to_string());
        let model = non_blank(&overrides.model)
            .or_else(|| same_provider.then(|| saved.model.clone()).flatten())
            .unwrap_or_else(|| provider.default_model().to_string());
        let api_key = non_blank(&overrides.api_key)
            .or_else(|| same_provider.then(|| saved.api_key.clone()).flatten());

        Ok(Self {
            provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
            max_tokens: saved.word_limit,
        })
    }

    pub fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            Error::Validation("No API key configured. Configure the model in settings.".to_string())
        })
    }
}

/// Builds a provider for a resolved model config.
pub trait ProviderFactory: Send + Sync {
    fn build(&self, config: &EffectiveModelConfig) -> Result<Arc<dyn LLMProvider>>;
}

pub struct HttpProviderFactory {
    timeout: Duration,
}

impl HttpProviderFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn build(&self, config: &EffectiveModelConfig) -> Result<Arc<dyn LLMProvider>> {
        let api_key = config.api_key()?.to_string();
        Ok(match config.provider {
            ProviderKind::Anthropic => Arc::new(ClaudeProvider::new(
                api_key,
                config.base_url.clone(),
                config.model.clone(),
                self.timeout,
            )?),
            ProviderKind::OpenAi | ProviderKind::DeepSeek | ProviderKind::Qwen => {
                Arc::new(OpenAiProvider::new(
                    config.provider.as_str(),
                    api_key,
                    config.base_url.clone(),
                    config.model.clone(),
                    self.timeout,
                )?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn saved() -> ModelConfig {
        ModelConfig {
            provider: ProviderKind::DeepSeek,
            base_url: Some("https://proxy.example.com/".to_string()),
            model: Some("deepseek-reasoner".to_string()),
            api_key: Some("saved-key".to_string()),
            word_limit: 4000,
            updated_at: None,
        }
    }

    #[test]
    fn test_resolve_without_overrides_uses_saved() {
        let config = EffectiveModelConfig::resolve(&saved(), &ModelOverride::default()).unwrap();
        assert_eq!(config.provider, ProviderKind::DeepSeek);
        assert_eq!(config.base_url, "https://proxy.example.com");
        assert_eq!(config.model, "deepseek-reasoner");
        assert_eq!(config.api_key.as_deref(), Some("saved-key"));
        assert_eq!(config.max_tokens, 4000);
    }

    #[test]
    fn test_resolve_override_wins_and_saved_is_untouched() {
        let saved = saved();
        let before = saved.clone();
        let overrides = ModelOverride {
            api_key: Some("call-key".to_string()),
            provider: Some("qwen".to_string()),
            base_url: None,
            model: None,
        };
        let config = EffectiveModelConfig::resolve(&saved, &overrides).unwrap();
        assert_eq!(config.provider, ProviderKind::Qwen);
        assert_eq!(config.model, "qwen-plus");
        assert_eq!(
            config.base_url,
            "https://dashscope.aliyuncs.com/compatible-mode/v1"
        );
        assert_eq!(config.api_key.as_deref(), Some("call-key"));
        assert_eq!(saved, before);

        let keyless = ModelOverride {
            provider: Some("qwen".to_string()),
            ..ModelOverride::default()
        };
        let config = EffectiveModelConfig::resolve(&saved, &keyless).unwrap();
        assert_eq!(config.api_key, None);
        assert!(matches!(config.api_key(), Err(Error::Validation(_))));

        let same_provider = ModelOverride {
            provider: Some("deepseek".to_string()),
            ..ModelOverride::default()
        };
        let config = EffectiveModelConfig::resolve(&saved, &same_provider).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("saved-key"));
    }

    #[test]
    fn test_resolve_rejects_unknown_provider() {
        let overrides = ModelOverride {
            provider: Some("mystery".to_string()),
            ..ModelOverride::default()
        };
        assert!(matches!(
            EffectiveModelConfig::resolve(&saved(), &overrides),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_missing_key_is_a_validation_error() {
        let config =
            EffectiveModelConfig::resolve(&ModelConfig::default(), &ModelOverride::default())
                .unwrap();
        assert_eq!(config.model, "gpt-3.5-turbo");
        assert!(matches!(config.api_key(), Err(Error::Validation(_))));
        let factory = HttpProviderFactory::new(Duration::from_secs(1));
        assert!(factory.build(&config).is_err());
    }
}
