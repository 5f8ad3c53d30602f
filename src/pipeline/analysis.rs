use crate::error::{Error, Result};
use crate::llm::parser::parse_findings;
use crate::llm::prompts::{analysis_prompt, ANALYSIS_SYSTEM_PROMPT};
use crate::llm::CompletionRequest;
use crate::models::analysis::{AnalysisResult, AnalyzeRequest};
use crate::models::repo::DiscoveredRepo;
use crate::pipeline::Pipeline;

const ANALYSIS_MAX_TOKENS: u32 = 2048;

impl Pipeline {
    /// Structured analysis of one repository. Call overrides apply to this
    /// call only; the saved model config is left untouched.
    pub async fn analyze(&self, request: AnalyzeRequest) -> Result<AnalysisResult> {
        let full_name = request.repo_full_name.trim();
        if full_name.is_empty() {
            return Err(Error::Validation("repo_full_name is required".to_string()));
        }

        let (provider, config) = self.model(&request.overrides)?;
        let (metadata, readme) = self.repository_context(full_name).await?;

        tracing::info!(
            "Analyzing {} with {} / {}",
            full_name,
            provider.name(),
            provider.model()
        );
        let prompt = analysis_prompt(
            &metadata.full_name,
            metadata.description.as_deref(),
            metadata.language.as_deref(),
            metadata.stars,
            readme.as_deref(),
        );
        let request = CompletionRequest::new(prompt, config.max_tokens.min(ANALYSIS_MAX_TOKENS))
            .with_system(ANALYSIS_SYSTEM_PROMPT);
        let reply = provider.complete(request).await?;
        let findings = parse_findings(&reply)?;

        let result =
            self.storage
                .insert_analysis(full_name, &findings, config.provider, &config.model)?;
        tracing::info!("Stored analysis {} for {}", result.id, full_name);
        Ok(result)
    }

    /// Metadata and README of a repository, from the local record and cache
    /// when present, from GitHub otherwise.
    async fn repository_context(&self, full_name: &str) -> Result<(DiscoveredRepo, Option<String>)> {
        if let Some(record) = self.storage.get_record_by_name(full_name)? {
            let cached = match &record.readme_path {
                Some(path) => tokio::fs::read_to_string(path).await.ok(),
                None => None,
            };
            let readme = match cached {
                Some(readme) => Some(readme),
                None => self.readme_or_none(full_name).await,
            };
            let metadata = DiscoveredRepo {
                full_name: record.full_name,
                url: record.url,
                description: record.description,
                language: record.language,
                stars: record.stars,
                forks: record.forks,
            };
            return Ok((metadata, readme));
        }

        let metadata = self.github.repository(full_name).await?;
        let readme = self.readme_or_none(full_name).await;
        Ok((metadata, readme))
    }

    async fn readme_or_none(&self, full_name: &str) -> Option<String> {
        match self.github.readme(full_name).await {
            Ok(readme) => readme,
            Err(e) => {
                tracing::warn!("README of {} unavailable: {}", full_name, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::analysis::ModelOverride;
    use crate::models::settings::{ConfigKind, ModelConfig, ProviderKind};
    use crate::test_support::{pipeline_with, FakeProviderFactory};
    use serde_json::json;

    const REPLY: &str = r#"```json
{"summary": "A tiny web server.", "highlights": ["fast"], "tech_stack": ["Rust"], "use_cases": [], "audience": "backend developers"}
```"#;

    fn request(overrides: ModelOverride) -> AnalyzeRequest {
        AnalyzeRequest {
            repo_full_name: "octo/server".to_string(),
            overrides,
        }
    }

    #[tokio::test]
    async fn test_analyze_stores_findings() {
        let llm = FakeProviderFactory::replying(REPLY);
        let (pipeline, _github, _dir) = pipeline_with(llm.clone());
        pipeline
            .registry()
            .save(ConfigKind::Model, json!({"provider": "deepseek", "api_key": "k"}))
            .unwrap();

        let result = pipeline.analyze(request(ModelOverride::default())).await.unwrap();
        assert_eq!(result.findings.summary, "A tiny web server.");
        assert_eq!(result.provider, ProviderKind::DeepSeek);
        assert_eq!(result.model, "deepseek-chat");
        assert!(llm.prompts()[0].contains("Stars: 999"));

        let stored = pipeline.storage().get_analysis(result.id).unwrap().unwrap();
        assert_eq!(stored.findings.tech_stack, vec!["Rust"]);
    }

    #[tokio::test]
    async fn test_overrides_are_not_persisted() {
        let (pipeline, _github, _dir) = pipeline_with(FakeProviderFactory::replying(REPLY));
        let overrides = ModelOverride {
            api_key: Some("call-key".to_string()),
            provider: Some("qwen".to_string()),
            ..ModelOverride::default()
        };

        let result = pipeline.analyze(request(overrides)).await.unwrap();
        assert_eq!(result.provider, ProviderKind::Qwen);

        let saved: ModelConfig = pipeline.registry().load().unwrap();
        assert_eq!(saved.api_key, None);
        assert_eq!(saved.provider, ProviderKind::OpenAi);
    }

    #[tokio::test]
    async fn test_analyze_errors() {
        let (pipeline, _github, _dir) = pipeline_with(FakeProviderFactory::replying(REPLY));

        let err = pipeline.analyze(request(ModelOverride::default())).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let bad = ModelOverride {
            api_key: Some("bad-key".to_string()),
            ..ModelOverride::default()
        };
        let err = pipeline.analyze(request(bad)).await.unwrap_err();
        assert!(matches!(err, Error::LLMApi(ref msg) if msg.contains("invalid api key")));

        let err = pipeline
            .analyze(AnalyzeRequest {
                repo_full_name: "  ".to_string(),
                overrides: ModelOverride::default(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
