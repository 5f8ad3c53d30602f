use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};

use crate::models::prompt::{PromptQuery, PromptTemplate, SavePromptRequest, SetDefaultRequest};
use crate::pipeline::Pipeline;
use crate::server::error::{ok, ApiResult};

pub async fn list(
    State(pipeline): State<Pipeline>,
    query: Result<Query<PromptQuery>, QueryRejection>,
) -> ApiResult<Vec<PromptTemplate>> {
    let Query(query) = query?;
    ok(pipeline.prompts(&query)?)
}

pub async fn save(
    State(pipeline): State<Pipeline>,
    payload: Result<Json<SavePromptRequest>, JsonRejection>,
) -> ApiResult<PromptTemplate> {
    let Json(request) = payload?;
    ok(pipeline.save_prompt(request)?)
}

pub async fn set_default(
    State(pipeline): State<Pipeline>,
    payload: Result<Json<SetDefaultRequest>, JsonRejection>,
) -> ApiResult<PromptTemplate> {
    let Json(request) = payload?;
    ok(pipeline.set_default_prompt(request.id)?)
}

pub async fn remove(
    State(pipeline): State<Pipeline>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<PromptTemplate> {
    let Path(id) = id?;
    ok(pipeline.delete_prompt(id)?)
}

pub fn router() -> Router<Pipeline> {
    Router::new()
        .route("/prompts", get(list).post(save))
        .route("/prompts/default", post(set_default))
        .route("/prompts/{id}", delete(remove))
}
