use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::repo::{RepoRecord, RepoStats, ReposQuery};
use crate::pipeline::Pipeline;
use crate::server::error::{ok, ApiError, ApiResult};

#[derive(Debug, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub version: String,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ReadmeQuery {
    pub path: String,
}

pub async fn health() -> ApiResult<Health> {
    ok(Health {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        time: Utc::now(),
    })
}

pub async fn list_repos(
    State(pipeline): State<Pipeline>,
    query: Result<Query<ReposQuery>, QueryRejection>,
) -> ApiResult<Vec<RepoRecord>> {
    let Query(query) = query?;
    ok(pipeline.repos(&query)?)
}

pub async fn list_repos_limited(
    State(pipeline): State<Pipeline>,
    limit: Result<Path<u32>, PathRejection>,
) -> ApiResult<Vec<RepoRecord>> {
    let Path(limit) = limit?;
    ok(pipeline.repos(&ReposQuery { limit: Some(limit) })?)
}

pub async fn stats(State(pipeline): State<Pipeline>) -> ApiResult<RepoStats> {
    ok(pipeline.stats()?)
}

pub async fn readme(
    State(pipeline): State<Pipeline>,
    query: Result<Query<ReadmeQuery>, QueryRejection>,
) -> ApiResult<String> {
    let Query(query) = query?;
    ok(pipeline.readme(&query.path).await?)
}

/// Raw Markdown written by the local publish target.
pub async fn published_file(
    State(pipeline): State<Pipeline>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let content = pipeline.published_file(&name).await?;
    Ok(([(header::CONTENT_TYPE, "text/markdown; charset=utf-8")], content))
}

pub fn router() -> Router<Pipeline> {
    Router::new()
        .route("/health", get(health))
        .route("/repos", get(list_repos))
        .route("/repos/{limit}", get(list_repos_limited))
        .route("/stats", get(stats))
        .route("/repo/readme", get(readme))
        .route("/files/{name}", get(published_file))
}
