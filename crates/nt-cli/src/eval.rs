//! Gold-file evaluation

use std::path::Path;

use anyhow::{bail, Context};
use colored::Colorize;
use nt_core::{DateContext, FilterObject};
use nt_extractor::{AggregateMetrics, FieldEvaluator};
use nt_pipeline::FilterPipeline;
use serde::Deserialize;

/// One line of a gold file
#[derive(Debug, Deserialize)]
pub struct GoldCase {
    pub query: String,
    /// Expected filter; absent keys are absent fields, an empty object means
    /// the query should be rejected as vague
    #[serde(default)]
    pub expected: FilterObject,
}

/// Parse a JSON-lines gold file, skipping blank and `#` lines
pub fn parse_gold(content: &str) -> anyhow::Result<Vec<GoldCase>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("gold case on line {}", i + 1))
        })
        .collect()
}

pub fn read_gold(path: &Path) -> anyhow::Result<Vec<GoldCase>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading gold file {}", path.display()))?;
    let cases = parse_gold(&content)?;
    if cases.is_empty() {
        bail!("no gold cases in {}", path.display());
    }
    Ok(cases)
}

/// Score the pipeline over every gold case
pub async fn evaluate(
    pipeline: &FilterPipeline,
    cases: &[GoldCase],
    ctx: DateContext,
    concurrency: usize,
    strict: bool,
    verbose: bool,
) -> AggregateMetrics {
    let evaluator = if strict {
        FieldEvaluator::new().strict()
    } else {
        FieldEvaluator::new()
    };

    let queries: Vec<String> = cases.iter().map(|case| case.query.clone()).collect();
    let results = pipeline.parse_batch(&queries, ctx, concurrency).await;

    let mut aggregate = AggregateMetrics::default();
    for (case, result) in cases.iter().zip(results) {
        match result {
            Ok(predicted) => {
                let evaluation = evaluator.evaluate(&predicted, &case.expected);
                if verbose && !evaluation.exact_match {
                    println!("{} {}", "MISMATCH".yellow().bold(), case.query);
                    println!(
                        "   expected {}",
                        serde_json::to_string(&case.expected).unwrap_or_default()
                    );
                    println!(
                        "   got      {}",
                        serde_json::to_string(&predicted).unwrap_or_default()
                    );
                }
                aggregate.add(&evaluation);
            }
            Err(err) => {
                let evaluation = evaluator.evaluate_failure(&case.expected);
                if verbose && !evaluation.exact_match {
                    println!("{} {} ({err})", "FAILED".red().bold(), case.query);
                }
                aggregate.add_failure(&evaluation);
            }
        }
    }
    aggregate
}
