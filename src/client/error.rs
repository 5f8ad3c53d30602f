use reqwest::StatusCode;
use thiserror::Error;

use crate::error::ErrorKind;

/// Failure of a call made through [`crate::client::ApiClient`]. A timeout
/// is reported apart from other transport failures and from errors the
/// server answered with.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{kind} error (HTTP {status}): {message}")]
    Remote {
        status: u16,
        kind: ErrorKind,
        message: String,
    },

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("invalid base URL: {0}")]
    InvalidUrl(String),
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Timeout(_) | ClientError::Transport(_) => ErrorKind::Transport,
            ClientError::Remote { kind, .. } => *kind,
            ClientError::Decode(_) => ErrorKind::Internal,
            ClientError::InvalidUrl(_) => ErrorKind::Validation,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout(err.to_string())
        } else if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}

/// Kind implied by a status code, for error bodies without `error_kind`.
pub fn kind_for_status(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ErrorKind::Validation,
        StatusCode::NOT_FOUND => ErrorKind::NotFound,
        StatusCode::CONFLICT => ErrorKind::Conflict,
        StatusCode::BAD_GATEWAY => ErrorKind::Provider,
        _ => ErrorKind::Internal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(ClientError::Timeout("5s".into()).kind(), ErrorKind::Transport);
        assert!(ClientError::Timeout("5s".into()).is_timeout());
        let remote = ClientError::Remote {
            status: 409,
            kind: ErrorKind::Conflict,
            message: "already audited".into(),
        };
        assert_eq!(remote.kind(), ErrorKind::Conflict);
        assert!(!remote.is_timeout());
        assert_eq!(kind_for_status(StatusCode::BAD_GATEWAY), ErrorKind::Provider);
    }
}
