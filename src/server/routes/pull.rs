use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::pull::{
    PullByConfigRequest, PullRunRequest, PullRunResult, PullTestResult, ReanalyzeResult,
};
use crate::models::repo::{Page, RePullRequest, RecordQuery, RecordView, RepoRecord};
use crate::pipeline::Pipeline;
use crate::server::error::{ok, ApiResult};

#[derive(Debug, Serialize, Deserialize)]
pub struct DeduplicateResult {
    pub removed: usize,
}

pub async fn run(
    State(pipeline): State<Pipeline>,
    payload: Result<Json<PullRunRequest>, JsonRejection>,
) -> ApiResult<PullRunResult> {
    let Json(request) = payload?;
    ok(pipeline.pull_run(request).await?)
}

pub async fn run_by_config(
    State(pipeline): State<Pipeline>,
    payload: Result<Json<PullByConfigRequest>, JsonRejection>,
) -> ApiResult<PullRunResult> {
    let Json(overrides) = payload?;
    ok(pipeline.pull_run_by_config(overrides).await?)
}

pub async fn records(
    State(pipeline): State<Pipeline>,
    query: Result<Query<RecordQuery>, QueryRejection>,
) -> ApiResult<Page<RecordView>> {
    let Query(query) = query?;
    ok(pipeline.records(&query)?)
}

pub async fn re_pull(
    State(pipeline): State<Pipeline>,
    payload: Result<Json<RePullRequest>, JsonRejection>,
) -> ApiResult<RepoRecord> {
    let Json(request) = payload?;
    ok(pipeline.re_pull(request).await?)
}

pub async fn test(
    State(pipeline): State<Pipeline>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<PullTestResult> {
    let Json(candidate) = payload?;
    ok(pipeline.pull_test(candidate).await?)
}

pub async fn deduplicate(State(pipeline): State<Pipeline>) -> ApiResult<DeduplicateResult> {
    ok(DeduplicateResult {
        removed: pipeline.deduplicate()?,
    })
}

pub async fn reanalyze_all(State(pipeline): State<Pipeline>) -> ApiResult<ReanalyzeResult> {
    ok(pipeline.reanalyze_all().await?)
}

pub fn router() -> Router<Pipeline> {
    Router::new()
        .route("/pull/run", post(run))
        .route("/pull/run/config", post(run_by_config))
        .route("/pull/records", get(records))
        .route("/pull/repull", post(re_pull))
        .route("/pull/test", post(test))
        .route("/pull/deduplicate", post(deduplicate))
        .route("/pull/reanalyze_all", post(reanalyze_all))
}
