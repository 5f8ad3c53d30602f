use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::models::publish::{PendingArticle, PublishLink, PublishRecord, PublishReport, PublishRequest};
use crate::pipeline::Pipeline;
use crate::server::error::{ok, ApiResult};

pub async fn pending(State(pipeline): State<Pipeline>) -> ApiResult<Vec<PendingArticle>> {
    ok(pipeline.publish_pending()?)
}

pub async fn publish(
    State(pipeline): State<Pipeline>,
    payload: Result<Json<PublishRequest>, JsonRejection>,
) -> ApiResult<PublishReport> {
    let Json(request) = payload?;
    ok(pipeline.publish(request).await?)
}

pub async fn history(State(pipeline): State<Pipeline>) -> ApiResult<Vec<PublishRecord>> {
    ok(pipeline.publish_history()?)
}

pub async fn links(State(pipeline): State<Pipeline>) -> ApiResult<Vec<PublishLink>> {
    ok(pipeline.publish_links()?)
}

pub fn router() -> Router<Pipeline> {
    Router::new()
        .route("/publish", post(publish))
        .route("/publish/pending", get(pending))
        .route("/publish/history", get(history))
        .route("/publish/links", get(links))
}
