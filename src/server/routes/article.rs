use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::models::analysis::{AnalysisResult, AnalyzeRequest};
use crate::models::review::{AuditRequest, ReviewDecision};
use crate::models::task::{
    ArticleTask, CreateTaskRequest, EnqueueRequest, LatestArticle, RegenerateRequest,
    SaveArticleRequest, TaskLog,
};
use crate::pipeline::Pipeline;
use crate::server::error::{ok, ApiResult};

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub async fn analyze(
    State(pipeline): State<Pipeline>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> ApiResult<AnalysisResult> {
    let Json(request) = payload?;
    ok(pipeline.analyze(request).await?)
}

pub async fn create_task(
    State(pipeline): State<Pipeline>,
    headers: HeaderMap,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> ApiResult<ArticleTask> {
    let Json(request) = payload?;
    ok(pipeline.create_task(request, idempotency_key(&headers))?)
}

pub async fn enqueue(
    State(pipeline): State<Pipeline>,
    headers: HeaderMap,
    payload: Result<Json<EnqueueRequest>, JsonRejection>,
) -> ApiResult<ArticleTask> {
    let Json(request) = payload?;
    ok(pipeline.enqueue(request, idempotency_key(&headers))?)
}

pub async fn tasks(State(pipeline): State<Pipeline>) -> ApiResult<Vec<ArticleTask>> {
    ok(pipeline.tasks()?)
}

pub async fn logs(
    State(pipeline): State<Pipeline>,
    task_id: Result<Path<String>, PathRejection>,
) -> ApiResult<TaskLog> {
    let Path(task_id) = task_id?;
    ok(pipeline.task_logs(&task_id)?)
}

pub async fn latest(State(pipeline): State<Pipeline>) -> ApiResult<LatestArticle> {
    ok(pipeline.latest_article()?)
}

pub async fn save(
    State(pipeline): State<Pipeline>,
    payload: Result<Json<SaveArticleRequest>, JsonRejection>,
) -> ApiResult<ArticleTask> {
    let Json(request) = payload?;
    ok(pipeline.save_article(request)?)
}

pub async fn regenerate(
    State(pipeline): State<Pipeline>,
    payload: Result<Json<RegenerateRequest>, JsonRejection>,
) -> ApiResult<ArticleTask> {
    let Json(request) = payload?;
    ok(pipeline.regenerate(request)?)
}

pub async fn pending_review(State(pipeline): State<Pipeline>) -> ApiResult<Vec<ArticleTask>> {
    ok(pipeline.pending_review()?)
}

pub async fn audit(
    State(pipeline): State<Pipeline>,
    payload: Result<Json<AuditRequest>, JsonRejection>,
) -> ApiResult<ReviewDecision> {
    let Json(request) = payload?;
    ok(pipeline.audit(request)?)
}

pub fn router() -> Router<Pipeline> {
    Router::new()
        .route("/analyze", post(analyze))
        .route("/article/create_task", post(create_task))
        .route("/article/latest", get(latest))
        .route("/article/save", post(save))
        .route("/article/regenerate", post(regenerate))
        .route("/article/tasks/pending_review", get(pending_review))
        .route("/article/audit", post(audit))
        .route("/make/tasks", get(tasks))
        .route("/make/logs/{task_id}", get(logs))
        .route("/make/enqueue", post(enqueue))
}
