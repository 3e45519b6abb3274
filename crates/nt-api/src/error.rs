//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use nt_core::NtError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    #[schema(example = "VAGUE_QUERY")]
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new("NOT_FOUND", format!("{resource} not found"))
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Pipeline(NtError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Pipeline(err) if err.is_rejection() => StatusCode::BAD_REQUEST,
            AppError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            AppError::NotFound(resource) => ApiError::not_found(&resource),
            AppError::Pipeline(err) => match err {
                NtError::VagueQuery => ApiError::new(
                    "VAGUE_QUERY",
                    "A consulta é muito vaga. Informe pelo menos um critério de filtro.",
                ),
                NtError::InvalidQuery(msg) => ApiError::new("BAD_REQUEST", msg),
                NtError::Inference(msg) => {
                    ApiError::new("INFERENCE_ERROR", "Inference provider failed").with_details(msg)
                }
                NtError::Extraction(msg) => {
                    ApiError::new("EXTRACTION_ERROR", "Could not extract a filter").with_details(msg)
                }
                NtError::MalformedOutput { reason, .. } => ApiError::new(
                    "MALFORMED_OUTPUT",
                    "Extracted filter was invalid after repair",
                )
                .with_details(reason),
                NtError::Config(msg) => {
                    ApiError::new("CONFIG_ERROR", "Server is misconfigured").with_details(msg)
                }
                NtError::Other(err) => {
                    ApiError::new("INTERNAL_ERROR", "Internal server error").with_details(err.to_string())
                }
            },
        };

        (status, Json(error)).into_response()
    }
}

impl From<NtError> for AppError {
    fn from(err: NtError) -> Self {
        AppError::Pipeline(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::from(NtError::VagueQuery).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(NtError::InvalidQuery("empty".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(NtError::MalformedOutput {
                raw: "{".into(),
                reason: "not JSON".into()
            })
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::from(NtError::Inference("timeout".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::NotFound("debug endpoint".into()).status(),
            StatusCode::NOT_FOUND
        );
    }
}
