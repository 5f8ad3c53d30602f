use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::{Error, ErrorKind};
use crate::server::response::ApiResponse;

/// Handler error: a pipeline error rendered as the JSON envelope with the
/// status code of its kind.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(Error::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(Error::Validation(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError(Error::Validation(rejection.body_text()))
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Provider => StatusCode::BAD_GATEWAY,
        ErrorKind::Transport | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = match self.0.kind() {
            // outbound calls made by the server surface as provider failures
            ErrorKind::Transport => ErrorKind::Provider,
            kind => kind,
        };
        let status = status_for(kind);
        if status.is_server_error() {
            tracing::error!("{} {}", status, self.0);
        } else {
            tracing::debug!("{} {}", status, self.0);
        }
        (status, Json(ApiResponse::error(kind, self.0.to_string()))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;

pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_per_kind() {
        let status = |e: Error| ApiError(e).into_response().status();
        assert_eq!(status(Error::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(Error::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(Error::Conflict("x".into())), StatusCode::CONFLICT);
        assert_eq!(status(Error::LLMApi("quota".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(status(Error::StoragePoisoned), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
