pub mod article;
pub mod prompts;
pub mod publish;
pub mod pull;
pub mod repos;
pub mod settings;
