pub mod client;
pub mod config;
pub mod error;
pub mod github;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod server;
pub mod settings;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use client::{ApiClient, ClientError};
pub use config::{ClientConfig, Config};
pub use error::{Error, ErrorKind, Result};
pub use github::GitHubClient;
pub use pipeline::Pipeline;
pub use storage::Storage;
