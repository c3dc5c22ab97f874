//! Inbound RPC server.

mod error;
mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;

use cast_models::rpc::routes::worker as routes;

use crate::runner::Runner;

pub use error::{RpcError, RpcResult};
pub use handlers::{
    transcoding_pipeline, HealthResponse, SELF_STREAM_PIPELINE, STREAM_PIPELINE,
};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<Runner>,
}

impl AppState {
    pub fn new(runner: Arc<Runner>) -> Self {
        Self { runner }
    }
}

/// Create the RPC router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let rpc_routes = Router::new()
        .route(routes::REQUEST_STREAM, post(handlers::request_stream))
        .route(routes::REQUEST_TRANSCODING, post(handlers::request_transcoding))
        .route(routes::REQUEST_STREAM_END, post(handlers::request_stream_end))
        .route(routes::INGEST_PUBLISH, post(handlers::ingest_publish));

    let health_routes = Router::new().route(routes::HEALTH, get(handlers::health));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route(routes::METRICS, get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .merge(rpc_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
