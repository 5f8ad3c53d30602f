//! JSON REST surface of the pipeline, mounted under `/api`.

pub mod error;
pub mod response;
pub mod routes;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::Result;
use crate::pipeline::Pipeline;

pub use error::{ApiError, ApiResult};
pub use response::ApiResponse;

pub const API_BASE: &str = "/api";

pub fn router(pipeline: Pipeline) -> Router {
    let api_routes = Router::new()
        .merge(routes::repos::router())
        .merge(routes::pull::router())
        .merge(routes::article::router())
        .merge(routes::settings::router())
        .merge(routes::publish::router())
        .merge(routes::prompts::router());

    Router::new()
        .nest(API_BASE, api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}

/// Serves the API on an already bound listener until the process stops.
pub async fn serve_on(listener: TcpListener, pipeline: Pipeline) -> Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!("Listening on http://{}{}", addr, API_BASE);
    axum::serve(listener, router(pipeline)).await?;
    Ok(())
}

pub async fn serve(bind_address: &str, pipeline: Pipeline) -> Result<()> {
    let listener = TcpListener::bind(bind_address).await?;
    serve_on(listener, pipeline).await
}
