use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;

use crate::models::settings::{ConfigKind, TestOutcome};
use crate::pipeline::Pipeline;
use crate::server::error::{ok, ApiResult};
use crate::server::response::ApiResponse;

type Body = Result<Json<Value>, JsonRejection>;

fn get_config(pipeline: &Pipeline, kind: ConfigKind) -> ApiResult<Value> {
    ok(pipeline.registry().get(kind)?)
}

fn save_config(pipeline: &Pipeline, kind: ConfigKind, payload: Body) -> ApiResult<Value> {
    let Json(value) = payload?;
    let saved = pipeline.registry().save(kind, value)?;
    Ok(Json(ApiResponse::success_with_message(
        saved,
        format!("{} config saved", kind),
    )))
}

async fn test_config(pipeline: &Pipeline, kind: ConfigKind, payload: Body) -> ApiResult<TestOutcome> {
    let Json(value) = payload?;
    ok(pipeline.registry().test(kind, value).await?)
}

pub async fn get_model(State(pipeline): State<Pipeline>) -> ApiResult<Value> {
    get_config(&pipeline, ConfigKind::Model)
}

pub async fn save_model(State(pipeline): State<Pipeline>, payload: Body) -> ApiResult<Value> {
    save_config(&pipeline, ConfigKind::Model, payload)
}

pub async fn test_model(State(pipeline): State<Pipeline>, payload: Body) -> ApiResult<TestOutcome> {
    test_config(&pipeline, ConfigKind::Model, payload).await
}

pub async fn get_pull(State(pipeline): State<Pipeline>) -> ApiResult<Value> {
    get_config(&pipeline, ConfigKind::Pull)
}

pub async fn save_pull(State(pipeline): State<Pipeline>, payload: Body) -> ApiResult<Value> {
    save_config(&pipeline, ConfigKind::Pull, payload)
}

pub async fn get_publish(State(pipeline): State<Pipeline>) -> ApiResult<Value> {
    get_config(&pipeline, ConfigKind::Publish)
}

pub async fn save_publish(State(pipeline): State<Pipeline>, payload: Body) -> ApiResult<Value> {
    save_config(&pipeline, ConfigKind::Publish, payload)
}

pub async fn test_publish(State(pipeline): State<Pipeline>, payload: Body) -> ApiResult<TestOutcome> {
    test_config(&pipeline, ConfigKind::Publish, payload).await
}

pub fn router() -> Router<Pipeline> {
    Router::new()
        .route("/config/model", get(get_model).post(save_model))
        .route("/config/model/test", post(test_model))
        .route("/pull/config", get(get_pull).post(save_pull))
        .route("/publish/config", get(get_publish).post(save_publish))
        .route("/publish/test", post(test_publish))
}
