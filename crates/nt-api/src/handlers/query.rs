//! Query parsing handlers

use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use nt_core::NtError;
use nt_pipeline::preview;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use utoipa::ToSchema;

/// Query request body
#[derive(Debug, Deserialize, ToSchema)]
pub struct QueryRequest {
    /// Free-text question in Portuguese
    #[schema(example = "notas rodando ordenadas pelo mais caro")]
    #[serde(default)]
    pub query: String,
}

/// Parse a question into a filter
#[utoipa::path(
    post,
    path = "/parse-query",
    tag = "query",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "Filter extracted", body = nt_core::FilterObject),
        (status = 400, description = "Empty or vague query", body = crate::error::ApiError),
        (status = 500, description = "Pipeline failure", body = crate::error::ApiError)
    )
)]
pub async fn parse_query_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();
    let start = Instant::now();
    info!(query = %preview(&req.query), "parse-query");

    let filter = state
        .pipeline
        .parse(&req.query)
        .await
        .inspect_err(|err| report(&state, err))?;

    info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        "parse-query done"
    );
    Ok((StatusCode::OK, Json(filter)))
}

/// Parse a question and return every intermediate result
#[utoipa::path(
    post,
    path = "/debug-query",
    tag = "query",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "Intermediate results", body = nt_pipeline::DebugReport),
        (status = 400, description = "Empty or vague query", body = crate::error::ApiError),
        (status = 404, description = "Debug endpoint disabled", body = crate::error::ApiError),
        (status = 500, description = "Pipeline failure", body = crate::error::ApiError)
    )
)]
pub async fn debug_query_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !state.config.server.debug_endpoint {
        return Err(AppError::NotFound("Debug endpoint".to_string()));
    }

    state.increment_requests();
    info!(query = %preview(&req.query), "debug-query");

    let report_body = state
        .pipeline
        .debug(&req.query)
        .await
        .inspect_err(|err| report(&state, err))?;

    Ok((StatusCode::OK, Json(report_body)))
}

fn report(state: &AppState, err: &NtError) {
    state.record_error(err);
    if err.is_rejection() {
        warn!(error = %err, "query rejected");
    } else {
        error!(error = %err, "query failed");
    }
}
