//! NT Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout the query parser:
//! - The filter object handed to the tracking query engine
//! - Closed business vocabularies (statuses, events, operations, states)
//! - Per-request date context used to resolve relative time expressions
//! - Common error types
//! - The inference capability trait
//! - Configuration management

pub mod config;
pub mod dates;
pub mod filter;
pub mod query;

pub use config::{
    AppConfig, ConfigError, ExtractorKind, LlmConfig, LlmProvider, LoggingConfig, NormalizerKind,
    PipelineConfig, ServerConfig,
};
pub use dates::DateContext;
pub use filter::{
    DateEventType, FilterObject, InvariantViolation, LogisticsStatus, OperationCode,
    PerformanceStatus, SortColumn, SortDirection, StateCode, UnknownValue,
};
pub use query::NormalizedQuery;

use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors surfaced by the query parsing pipeline
#[derive(Error, Debug)]
pub enum NtError {
    /// The inference mechanism could not produce output (unavailable,
    /// rate-limited, timed out or errored).
    #[error("Inference error: {0}")]
    Inference(String),

    /// The extraction stage produced no candidate at all.
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// The candidate was invalid and the single repair attempt was invalid too.
    #[error("Malformed output after repair: {reason}")]
    MalformedOutput { raw: String, reason: String },

    /// Every filter field is absent.
    #[error("Query is too vague to produce any filter")]
    VagueQuery,

    /// Rejected at the boundary, before entering the pipeline.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NtError {
    /// Whether the error is the caller's fault (client-error class) rather
    /// than a failure of the system.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::VagueQuery | Self::InvalidQuery(_))
    }
}

pub type Result<T> = std::result::Result<T, NtError>;

// ============================================================================
// Traits
// ============================================================================

/// Text-in, text-out inference capability.
///
/// Used for normalization, extraction and repair. Implementations may be a
/// hosted model, a local model or anything else that answers a prompt.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a response
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Provider/model label for logging
    fn name(&self) -> &str {
        "llm"
    }
}

// ============================================================================
// Tests
// ============================================================================
