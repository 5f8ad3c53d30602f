use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("GitHub API error: {0}")]
    GitHubApi(String),

    #[error("Rate limit exceeded, retry after {0} seconds")]
    RateLimited(u64),

    #[error("LLM API error: {0}")]
    LLMApi(String),

    #[error("Publish target error: {0}")]
    PublishTarget(String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("State conflict: {0}")]
    Conflict(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage lock poisoned")]
    StoragePoisoned,

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure classes surfaced to callers so a presentation layer can choose
/// between a banner, a toast or an inline field error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The call could not be made or did not complete (network, timeout).
    Transport,
    /// Malformed configuration or parameters.
    Validation,
    /// The LLM, GitHub or a publish target rejected the request.
    Provider,
    /// The operation is not allowed in the resource's current state.
    Conflict,
    NotFound,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Transport => write!(f, "transport"),
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Provider => write!(f, "provider"),
            ErrorKind::Conflict => write!(f, "conflict"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

impl Error {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RateLimited(_) | Error::Network(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::GitHubApi(_)
            | Error::RateLimited(_)
            | Error::LLMApi(_)
            | Error::PublishTarget(_)
            | Error::ParseError(_) => ErrorKind::Provider,
            Error::Network(_) => ErrorKind::Transport,
            Error::Config(_) | Error::Validation(_) | Error::InvalidHeader(_) => {
                ErrorKind::Validation
            }
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Serialization(_) | Error::Io(_) | Error::Database(_) | Error::StoragePoisoned => {
                ErrorKind::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(Error::Validation("x".into()).kind(), ErrorKind::Validation);
        assert_eq!(Error::Conflict("x".into()).kind(), ErrorKind::Conflict);
        assert_eq!(Error::LLMApi("quota".into()).kind(), ErrorKind::Provider);
        assert_eq!(Error::StoragePoisoned.kind(), ErrorKind::Internal);
        assert_eq!(ErrorKind::NotFound.to_string(), "not_found");
    }

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(Error::RateLimited(30).is_retryable());
        assert!(!Error::Conflict("audited".into()).is_retryable());
    }
}
