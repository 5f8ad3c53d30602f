use crate::error::{Error, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub database_path: String,
    pub data_dir: PathBuf,
    pub github_token: Option<String>,
    pub worker_concurrency: usize,
    pub persist_simulated_pulls: bool,
    /// Runs saved pull and publish schedules while serving.
    pub scheduler_enabled: bool,
    pub request_timeout: Duration,
    pub llm_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:5001".to_string(),
            database_path: "repopress.db".to_string(),
            data_dir: PathBuf::from("data"),
            github_token: None,
            worker_concurrency: 2,
            persist_simulated_pulls: false,
            scheduler_enabled: true,
            request_timeout: Duration::from_secs(30),
            llm_timeout: Duration::from_secs(600),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let bind_address = env::var("REPOPRESS_BIND").unwrap_or(defaults.bind_address);

        let database_path = env::var("DATABASE_PATH").unwrap_or(defaults.database_path);

        let data_dir = env::var("REPOPRESS_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let github_token = env::var("GITHUB_TOKEN").ok().filter(|t| !t.trim().is_empty());

        let worker_concurrency = parse_var("WORKER_CONCURRENCY", defaults.worker_concurrency)?;
        if worker_concurrency == 0 {
            return Err(Error::Config(
                "WORKER_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        let persist_simulated_pulls = env::var("PERSIST_SIMULATED_PULLS")
            .ok()
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(defaults.persist_simulated_pulls);

        let scheduler_enabled = env::var("SCHEDULER_ENABLED")
            .ok()
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(defaults.scheduler_enabled);

        let request_timeout = Duration::from_secs(parse_var("REQUEST_TIMEOUT_SECS", 30u64)?);
        let llm_timeout = Duration::from_secs(parse_var("LLM_TIMEOUT_SECS", 600u64)?);

        Ok(Self {
            bind_address,
            database_path,
            data_dir,
            github_token,
            worker_concurrency,
            persist_simulated_pulls,
            scheduler_enabled,
            request_timeout,
            llm_timeout,
        })
    }

    pub fn repos_dir(&self) -> PathBuf {
        self.data_dir.join("repos")
    }

    pub fn published_dir(&self) -> PathBuf {
        self.data_dir.join("published")
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} has an invalid value: {}", name, raw))),
        Err(_) => Ok(default),
    }
}

/// Settings for [`crate::client::ApiClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5001/api".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env::var("REPOPRESS_API").unwrap_or(defaults.base_url),
            timeout: defaults.timeout,
        }
    }
}
