pub mod claude;
pub mod openai;
pub mod parser;
pub mod prompts;
pub mod provider;

pub use claude::ClaudeProvider;
pub use openai::OpenAiProvider;
pub use provider::{
    CompletionRequest, EffectiveModelConfig, HttpProviderFactory, LLMProvider, ProviderFactory,
};
