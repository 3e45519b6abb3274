//! NT API - HTTP server for the tracking query parser
//!
//! Exposes `/parse-query` and `/debug-query` over the pipeline, plus
//! health probes and the OpenAPI document.

pub mod error;
pub mod handlers;
pub mod state;

use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use handlers::{health, query};
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        health::readiness_check,
        health::metrics,
        query::parse_query_handler,
        query::debug_query_handler,
    ),
    components(schemas(
        nt_core::FilterObject,
        nt_core::DateContext,
        nt_pipeline::DebugReport,
        query::QueryRequest,
        error::ApiError,
        health::HealthResponse,
        health::BuildInfo,
        health::ReadinessResponse,
        health::ReadinessChecks,
        health::MetricsResponse,
    )),
    tags(
        (name = "query", description = "Natural-language query parsing"),
        (name = "health", description = "Probes and counters")
    ),
    info(
        title = "NT Query Parser API",
        description = "Turns Portuguese shipment questions into structured invoice filters"
    )
)]
pub struct ApiDoc;

/// Build the router over shared state
pub fn create_router(state: Arc<AppState>) -> Router {
    let server = &state.config.server;
    let timeout = TimeoutLayer::new(Duration::from_secs(server.request_timeout_secs));
    let cors = cors_layer(&server.cors_origins);
    let cors_enabled = server.cors_enabled;

    let router = Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics))
        .route("/parse-query", post(query::parse_query_handler))
        .route("/debug-query", post(query::debug_query_handler))
        .route("/api-docs/openapi.json", get(openapi_json))
        .with_state(state)
        .layer(timeout);

    let router = if cors_enabled {
        router.layer(cors)
    } else {
        router
    };
    router.layer(TraceLayer::new_for_http())
}

/// Router with default configuration and the rule-based pipeline
pub fn create_router_for_testing() -> Router {
    create_router(Arc::new(AppState::default()))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    if origins.is_empty() {
        return base.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(parsed)
}
