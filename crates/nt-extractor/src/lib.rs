//! NT Extractor - Deterministic query understanding
//!
//! Turns a shipment tracking question into a [`nt_core::FilterObject`]:
//! - Rule-based normalization into canonical business vocabulary
//! - Token tagging with regex patterns and dictionaries
//! - The ordered disambiguation procedure over tagged tokens
//! - Schema validation of filter candidates produced elsewhere
//! - Concept oracle and evaluation metrics

use serde::Serialize;

use nt_core::{
    DateEventType, LogisticsStatus, OperationCode, PerformanceStatus, SortColumn, SortDirection,
    StateCode,
};

use crate::temporal::TimeExpr;

/// What a tagged span means
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TagKind {
    InvoiceNumber(u64),
    CnpjRoot(String),
    Time(TimeExpr),
    /// Unambiguous date event ("emitidas", "data de entrega")
    Event(DateEventType),
    /// Bare "entregue(s)": a date event or a logistics state depending on
    /// whether a time expression anchors it
    Delivered,
    Logistics(LogisticsStatus),
    Performance(PerformanceStatus),
    State(StateCode),
    City {
        name: String,
        state: Option<StateCode>,
    },
    Operation(OperationCode),
    Client(String),
    Carrier(String),
    Sort {
        column: Option<SortColumn>,
        direction: Option<SortDirection>,
    },
}

/// A recognized span of the query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tag {
    pub kind: TagKind,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub confidence: f32,
}

impl Tag {
    /// Byte distance between two non-overlapping spans
    pub fn gap(&self, other: &Tag) -> usize {
        if self.end <= other.start {
            other.start - self.end
        } else {
            self.start.saturating_sub(other.end)
        }
    }
}

/// Trait for token taggers
pub trait TokenTagger: Send + Sync {
    /// Non-overlapping tags ordered by position
    fn tag(&self, text: &str) -> Vec<Tag>;
}

pub mod concepts;
pub mod metrics;
pub mod normalizer;
pub mod rules;
pub mod schema;
pub mod tagger;
pub mod temporal;
pub mod vocab;

pub use concepts::{concepts_of, concepts_of_tags, Concept};
pub use metrics::{AggregateMetrics, Evaluation, FieldEvaluator, FieldMetrics};
pub use normalizer::RuleNormalizer;
pub use rules::{decide_tags, Decision, Rule, RuleEngine, RuleFired};
pub use schema::{isolate_json, CandidateValidator, FilterSchema, ValidationError};
pub use tagger::RuleTagger;
