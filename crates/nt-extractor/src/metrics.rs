//! Extraction quality metrics
//!
//! Scores predicted filters against gold filters field by field, with
//! precision, recall, F1 and exact-match rate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use nt_core::FilterObject;

use crate::vocab;

/// Free-text fields compared loosely unless the evaluator is strict
const FREE_TEXT_FIELDS: [&str; 3] = ["Cliente", "Transportadora", "CidadeDestino"];

// ============================================================================
// Field Metrics
// ============================================================================

/// Confusion counts for one filter field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMetrics {
    /// Predicted value equals the gold value
    pub true_positives: usize,
    /// Predicted a value the gold filter does not have
    pub false_positives: usize,
    /// Missed or got wrong a gold value
    pub false_negatives: usize,
    /// Both absent
    pub true_negatives: usize,
}

impl FieldMetrics {
    /// Calculate precision (TP / (TP + FP))
    pub fn precision(&self) -> f32 {
        if self.true_positives + self.false_positives == 0 {
            0.0
        } else {
            self.true_positives as f32 / (self.true_positives + self.false_positives) as f32
        }
    }

    /// Calculate recall (TP / (TP + FN))
    pub fn recall(&self) -> f32 {
        if self.true_positives + self.false_negatives == 0 {
            0.0
        } else {
            self.true_positives as f32 / (self.true_positives + self.false_negatives) as f32
        }
    }

    /// Calculate F1 score (2 * P * R / (P + R))
    pub fn f1_score(&self) -> f32 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    /// Share of queries where the field was right, absent values included
    pub fn accuracy(&self) -> f32 {
        let total = self.true_positives
            + self.false_positives
            + self.false_negatives
            + self.true_negatives;
        if total == 0 {
            0.0
        } else {
            (self.true_positives + self.true_negatives) as f32 / total as f32
        }
    }

    fn merge(&mut self, other: &FieldMetrics) {
        self.true_positives += other.true_positives;
        self.false_positives += other.false_positives;
        self.false_negatives += other.false_negatives;
        self.true_negatives += other.true_negatives;
    }
}

/// Result of scoring one query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Evaluation {
    pub fields: BTreeMap<String, FieldMetrics>,
    pub exact_match: bool,
}

// ============================================================================
// Evaluator
// ============================================================================

/// Field-by-field comparison of predicted and gold filters
pub struct FieldEvaluator {
    /// Compare free text exactly instead of case- and accent-insensitively
    strict: bool,
}

impl FieldEvaluator {
    pub fn new() -> Self {
        Self { strict: false }
    }

    /// Require exact free-text matches
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    fn values_match(&self, field: &str, predicted: &str, gold: &str) -> bool {
        if self.strict || !FREE_TEXT_FIELDS.contains(&field) {
            predicted == gold
        } else {
            vocab::fold(predicted.trim()) == vocab::fold(gold.trim())
        }
    }

    /// Score a predicted filter against the gold one
    pub fn evaluate(&self, predicted: &FilterObject, gold: &FilterObject) -> Evaluation {
        let mut fields = BTreeMap::new();
        let mut exact_match = true;

        for ((field, predicted), (_, gold)) in predicted
            .field_values()
            .into_iter()
            .zip(gold.field_values())
        {
            let mut metrics = FieldMetrics::default();
            match (predicted, gold) {
                (Some(p), Some(g)) if self.values_match(field, &p, &g) => {
                    metrics.true_positives = 1;
                }
                (Some(_), Some(_)) => {
                    // A wrong value is both a spurious and a missed one
                    metrics.false_positives = 1;
                    metrics.false_negatives = 1;
                    exact_match = false;
                }
                (Some(_), None) => {
                    metrics.false_positives = 1;
                    exact_match = false;
                }
                (None, Some(_)) => {
                    metrics.false_negatives = 1;
                    exact_match = false;
                }
                (None, None) => metrics.true_negatives = 1,
            }
            fields.insert(field.to_string(), metrics);
        }

        Evaluation {
            fields,
            exact_match,
        }
    }

    /// Score a query the pipeline failed on: every gold value is missed
    pub fn evaluate_failure(&self, gold: &FilterObject) -> Evaluation {
        let fields = gold
            .field_values()
            .into_iter()
            .map(|(field, value)| {
                let metrics = if value.is_some() {
                    FieldMetrics {
                        false_negatives: 1,
                        ..Default::default()
                    }
                } else {
                    FieldMetrics {
                        true_negatives: 1,
                        ..Default::default()
                    }
                };
                (field.to_string(), metrics)
            })
            .collect();

        Evaluation {
            fields,
            // Rejecting a query whose gold filter is empty is the right answer
            exact_match: gold.is_empty(),
        }
    }
}

impl Default for FieldEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Aggregate Metrics
// ============================================================================

/// Aggregate metrics for a batch of evaluations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub fields: BTreeMap<String, FieldMetrics>,
    pub num_queries: usize,
    pub exact_matches: usize,
    pub failures: usize,
}

impl AggregateMetrics {
    /// Add one scored query
    pub fn add(&mut self, evaluation: &Evaluation) {
        self.num_queries += 1;
        if evaluation.exact_match {
            self.exact_matches += 1;
        }
        for (field, metrics) in &evaluation.fields {
            self.fields.entry(field.clone()).or_default().merge(metrics);
        }
    }

    /// Add a query the pipeline failed on
    pub fn add_failure(&mut self, evaluation: &Evaluation) {
        self.failures += 1;
        self.add(evaluation);
    }

    /// Micro-averaged counts over every field
    pub fn overall(&self) -> FieldMetrics {
        let mut total = FieldMetrics::default();
        for metrics in self.fields.values() {
            total.merge(metrics);
        }
        total
    }

    pub fn exact_match_rate(&self) -> f32 {
        if self.num_queries == 0 {
            0.0
        } else {
            self.exact_matches as f32 / self.num_queries as f32
        }
    }

    /// Print a summary report
    pub fn report(&self) -> String {
        let overall = self.overall();
        let mut report = format!(
            "=== Extraction Quality Report ===\n\n\
             Queries evaluated: {} ({} failed)\n\
             Exact match:       {:.1}%\n\n\
             Overall:\n\
               Precision: {:.1}%\n\
               Recall:    {:.1}%\n\
               F1 Score:  {:.1}%\n\n\
             Per field:\n",
            self.num_queries,
            self.failures,
            self.exact_match_rate() * 100.0,
            overall.precision() * 100.0,
            overall.recall() * 100.0,
            overall.f1_score() * 100.0,
        );

        // Wire order, skipping fields no gold or predicted filter ever used
        for field in FilterObject::FIELD_NAMES {
            let Some(metrics) = self.fields.get(field) else {
                continue;
            };
            if metrics.true_positives + metrics.false_positives + metrics.false_negatives == 0 {
                continue;
            }
            report.push_str(&format!(
                "  {:<18} P {:>5.1}%  R {:>5.1}%  F1 {:>5.1}%  (TP {} | FP {} | FN {})\n",
                field,
                metrics.precision() * 100.0,
                metrics.recall() * 100.0,
                metrics.f1_score() * 100.0,
                metrics.true_positives,
                metrics.false_positives,
                metrics.false_negatives,
            ));
        }

        report
    }

    /// Whether the overall F1 score reaches `min_f1`
    pub fn meets_threshold(&self, min_f1: f32) -> bool {
        self.overall().f1_score() >= min_f1
    }
}

// ============================================================================
// Tests
// ============================================================================
