use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::models::pull::{is_clock_time, PullConfig};

/// Key of a singleton configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigKind {
    Model,
    Pull,
    Publish,
}

impl ConfigKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKind::Model => "model",
            ConfigKind::Pull => "pull",
            ConfigKind::Publish => "publish",
        }
    }
}

impl std::fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configuration document stored under one [`ConfigKind`].
pub trait ConfigDocument: Serialize + DeserializeOwned + Default + Clone + Send + Sync {
    const KIND: ConfigKind;

    /// Checks the document and normalizes it in place before it is saved.
    fn normalize(&mut self) -> Result<()>;

    fn touch(&mut self);
}

impl ConfigDocument for PullConfig {
    const KIND: ConfigKind = ConfigKind::Pull;

    fn normalize(&mut self) -> Result<()> {
        self.sources.retain(|s| !s.trim().is_empty());
        if self.sources.is_empty() {
            self.sources.push("github".to_string());
        }
        self.validate()
    }

    fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    DeepSeek,
    Qwen,
    Anthropic,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Qwen => "qwen",
            ProviderKind::Anthropic => "anthropic",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-3.5-turbo",
            ProviderKind::DeepSeek => "deepseek-chat",
            ProviderKind::Qwen => "qwen-plus",
            ProviderKind::Anthropic => "claude-sonnet-4-20250514",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::DeepSeek => "https://api.deepseek.com",
            ProviderKind::Qwen => "https://dashscope.aliyuncs.com/compatible-mode/v1",
            ProviderKind::Anthropic => "https://api.anthropic.com",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "deepseek" => Ok(ProviderKind::DeepSeek),
            "qwen" => Ok(ProviderKind::Qwen),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            other => Err(Error::Validation(format!("unknown model provider '{}'", other))),
        }
    }
}

fn default_word_limit() -> u32 {
    ModelConfig::DEFAULT_WORD_LIMIT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Upper bound on generated output, in tokens.
    #[serde(default = "default_word_limit")]
    pub word_limit: u32,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            base_url: None,
            model: None,
            api_key: None,
            word_limit: Self::DEFAULT_WORD_LIMIT,
            updated_at: None,
        }
    }
}

impl ModelConfig {
    pub const DEFAULT_WORD_LIMIT: u32 = 8000;
}

impl ConfigDocument for ModelConfig {
    const KIND: ConfigKind = ConfigKind::Model;

    fn normalize(&mut self) -> Result<()> {
        self.base_url = non_blank(self.base_url.take());
        self.model = non_blank(self.model.take());
        self.api_key = non_blank(self.api_key.take());
        if let Some(url) = &self.base_url {
            require_http_url("base_url", url)?;
        }
        if !(100..=100_000).contains(&self.word_limit) {
            return Err(Error::Validation(
                "word_limit must be between 100 and 100000".to_string(),
            ));
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishTargetKind {
    /// Markdown file under the data directory.
    Local,
    /// JSON POST to an HTTP endpoint.
    Webhook,
    /// Draft in a WeChat official account. `app_id` plus `api_key` as the app secret.
    Wechat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishTargetConfig {
    pub name: String,
    pub kind: PublishTargetKind,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub targets: Vec<PublishTargetConfig>,
    pub account: Option<String>,
    pub publish_time: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            targets: vec![PublishTargetConfig {
                name: "local".to_string(),
                kind: PublishTargetKind::Local,
                endpoint: None,
                api_key: None,
                app_id: None,
            }],
            account: None,
            publish_time: None,
            updated_at: None,
        }
    }
}

impl PublishConfig {
    pub fn target(&self, name: &str) -> Option<&PublishTargetConfig> {
        self.targets.iter().find(|t| t.name == name)
    }
}

impl ConfigDocument for PublishConfig {
    const KIND: ConfigKind = ConfigKind::Publish;

    fn normalize(&mut self) -> Result<()> {
        let mut seen = HashSet::new();
        for target in &mut self.targets {
            target.name = target.name.trim().to_string();
            target.endpoint = non_blank(target.endpoint.take());
            target.api_key = non_blank(target.api_key.take());
            target.app_id = non_blank(target.app_id.take());
            if target.name.is_empty() {
                return Err(Error::Validation("publish target name is required".to_string()));
            }
            if !seen.insert(target.name.clone()) {
                return Err(Error::Validation(format!(
                    "duplicate publish target '{}'",
                    target.name
                )));
            }
            if target.kind == PublishTargetKind::Webhook {
                let endpoint = target.endpoint.as_deref().ok_or_else(|| {
                    Error::Validation(format!("webhook target '{}' needs an endpoint", target.name))
                })?;
                require_http_url("endpoint", endpoint)?;
            }
            if target.kind == PublishTargetKind::Wechat {
                if target.app_id.is_none() || target.api_key.is_none() {
                    return Err(Error::Validation(format!(
                        "wechat target '{}' needs app_id and api_key (app secret)",
                        target.name
                    )));
                }
                if let Some(endpoint) = target.endpoint.as_deref() {
                    require_http_url("endpoint", endpoint)?;
                }
            }
        }
        self.account = non_blank(self.account.take());
        self.publish_time = non_blank(self.publish_time.take());
        if let Some(time) = self.publish_time.as_deref() {
            if !is_clock_time(time) {
                return Err(Error::Validation(format!(
                    "publish_time must be HH:MM, got '{}'",
                    time
                )));
            }
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}

/// Result of a live configuration check. A failed check is still a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub ok: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
}

impl TestOutcome {
    pub fn passed(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            reply: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            reply: None,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn require_http_url(field: &str, url: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "{} must be an http(s) URL, got '{}'",
            field, url
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_config_normalizes_blanks() {
        let mut config: ModelConfig = serde_json::from_str(
            r#"{"provider": "deepseek", "api_key": "  ", "model": " deepseek-chat "}"#,
        )
        .unwrap();
        config.normalize().unwrap();
        assert_eq!(config.provider, ProviderKind::DeepSeek);
        assert_eq!(config.api_key, None);
        assert_eq!(config.model.as_deref(), Some("deepseek-chat"));
        assert_eq!(config.word_limit, 8000);
    }

    #[test]
    fn test_model_config_rejects_bad_url() {
        let mut config = ModelConfig {
            base_url: Some("ftp://example.com".to_string()),
            ..ModelConfig::default()
        };
        assert!(matches!(config.normalize(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_unknown_provider_is_rejected_by_serde() {
        let parsed: std::result::Result<ModelConfig, _> =
            serde_json::from_str(r#"{"provider": "mystery"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_publish_config_validation() {
        let mut config = PublishConfig::default();
        config.normalize().unwrap();
        assert!(config.target("local").is_some());

        config.targets.push(PublishTargetConfig {
            name: "blog".to_string(),
            kind: PublishTargetKind::Webhook,
            endpoint: None,
            api_key: None,
            app_id: None,
        });
        assert!(config.normalize().is_err());

        config.targets[1].endpoint = Some("https://blog.example.com/hook".to_string());
        config.normalize().unwrap();

        config.targets[1].name = "local".to_string();
        assert!(config.normalize().is_err());
    }

    #[test]
    fn test_wechat_target_needs_credentials() {
        let mut config: PublishConfig = serde_json::from_str(
            r#"{"targets": [{"name": "mp", "kind": "wechat", "app_id": " wx123 "}]}"#,
        )
        .unwrap();
        assert!(matches!(config.normalize(), Err(Error::Validation(_))));

        config.targets[0].api_key = Some("secret".to_string());
        config.normalize().unwrap();
        assert_eq!(config.targets[0].app_id.as_deref(), Some("wx123"));
        assert_eq!(config.targets[0].endpoint, None);

        config.publish_time = Some("25:00".to_string());
        assert!(matches!(config.normalize(), Err(Error::Validation(_))));
        config.publish_time = Some(" 10:30 ".to_string());
        config.normalize().unwrap();
        assert_eq!(config.publish_time.as_deref(), Some("10:30"));
    }

    #[test]
    fn test_provider_defaults() {
        assert_eq!(ProviderKind::Qwen.default_model(), "qwen-plus");
        assert_eq!(
            ProviderKind::DeepSeek.default_base_url(),
            "https://api.deepseek.com"
        );
        assert_eq!("Claude".parse::<ProviderKind>().unwrap(), ProviderKind::Anthropic);
    }
}
