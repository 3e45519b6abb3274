//! Batch harness: run a file of queries one by one, retrying failures

use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Local;
use colored::Colorize;
use nt_core::DateContext;
use nt_pipeline::FilterPipeline;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Queries in a test file: one per line, skipping blanks and lines that
/// start with `#` or `=`
pub fn parse_query_file(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('='))
        .map(str::to_string)
        .collect()
}

pub fn read_query_file(path: &Path) -> anyhow::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading query file {}", path.display()))?;
    Ok(parse_query_file(&content))
}

/// Why one attempt did not produce a result
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub message: String,
    /// Rejections (vague or empty queries) are final
    pub retryable: bool,
}

impl Failure {
    fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    fn rejected(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

/// Where the queries are parsed
pub enum Target {
    Local {
        pipeline: FilterPipeline,
        ctx: Option<DateContext>,
    },
    Remote {
        client: reqwest::Client,
        url: String,
    },
}

impl Target {
    pub fn remote(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self::Remote {
            client,
            url: format!("{}/debug-query", endpoint.trim_end_matches('/')),
        })
    }

    /// Debug report for one query, as JSON
    pub async fn debug(&self, query: &str) -> Result<Value, Failure> {
        match self {
            Target::Local { pipeline, ctx } => {
                let ctx = ctx.unwrap_or_else(DateContext::now);
                match pipeline.debug_at(query, ctx).await {
                    Ok(report) => serde_json::to_value(report)
                        .map_err(|e| Failure::rejected(format!("unserializable report: {e}"))),
                    Err(e) if e.is_rejection() => Err(Failure::rejected(e.to_string())),
                    Err(e) => Err(Failure::retryable(e.to_string())),
                }
            }
            Target::Remote { client, url } => {
                let response = client
                    .post(url)
                    .json(&json!({ "query": query }))
                    .send()
                    .await
                    .map_err(|e| Failure::retryable(format!("connection failed: {e}")))?;

                let status = response.status();
                let body: Value = response
                    .json()
                    .await
                    .map_err(|e| Failure::retryable(format!("unreadable response: {e}")))?;

                if status.is_success() {
                    Ok(body)
                } else {
                    let message = format!(
                        "API error (status {}): {}",
                        status.as_u16(),
                        body["message"].as_str().unwrap_or("unknown error")
                    );
                    if status.is_client_error() && status.as_u16() != 429 {
                        Err(Failure::rejected(message))
                    } else {
                        Err(Failure::retryable(message))
                    }
                }
            }
        }
    }
}

/// Run `attempt` until it succeeds, fails for good, or `retries` extra
/// attempts were spent. Returns the final result and the attempts made.
pub async fn with_retries<T, F, Fut>(
    retries: u32,
    delay: Duration,
    mut attempt: F,
) -> (Result<T, Failure>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Failure>>,
{
    let mut made = 0;
    loop {
        made += 1;
        match attempt().await {
            Err(failure) if failure.retryable && made <= retries => {
                warn!(attempt = made, error = %failure.message, "attempt failed, retrying");
                println!(
                    "{}",
                    format!(
                        "   {} - waiting {:.1}s before retrying the same query",
                        failure.message,
                        delay.as_secs_f64()
                    )
                    .yellow()
                );
                tokio::time::sleep(delay).await;
            }
            result => return (result, made),
        }
    }
}

/// Options of the `batch` command
pub struct BatchOptions {
    pub retries: u32,
    pub retry_delay: Duration,
    pub delay: Duration,
}

/// Totals of one batch run
#[derive(Debug, Default, PartialEq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub rejected: usize,
    pub failed: usize,
}

pub async fn run(target: &Target, queries: &[String], options: &BatchOptions) -> BatchSummary {
    let banner = "=============================================".magenta().bold();
    println!("{banner}");
    println!("{}", " QUERY PARSER TEST RUN".magenta().bold());
    println!("{banner}\n");

    let mut summary = BatchSummary::default();
    let total = queries.len();

    for (i, query) in queries.iter().enumerate() {
        println!("{}", format!("--- TEST #{}/{} ---", i + 1, total).cyan().bold());
        println!("Query: {query}\n");

        let started_at = Local::now();
        let start = Instant::now();
        println!(
            "{}",
            format!("Request started at {}", started_at.format("%H:%M:%S")).dimmed()
        );

        let (result, attempts) =
            with_retries(options.retries, options.retry_delay, || target.debug(query)).await;
        debug!(attempts, "query finished");

        match result {
            Ok(report) => {
                summary.succeeded += 1;
                print_report(&report);
                println!(
                    "{}",
                    format!(
                        "Response time: {:.2}s (start {} | end {})",
                        start.elapsed().as_secs_f64(),
                        started_at.format("%H:%M:%S"),
                        Local::now().format("%H:%M:%S")
                    )
                    .blue()
                    .bold()
                );
            }
            Err(failure) if !failure.retryable => {
                summary.rejected += 1;
                println!("{}", format!("Rejected: {}", failure.message).yellow());
            }
            Err(failure) => {
                summary.failed += 1;
                println!(
                    "{}",
                    format!("Failed after {attempts} attempt(s): {}", failure.message).red()
                );
            }
        }

        println!("{}", "---------------------\n".cyan().bold());
        if i + 1 < total && !options.delay.is_zero() {
            tokio::time::sleep(options.delay).await;
        }
    }

    println!("{banner}");
    println!(
        "{}",
        format!(
            " DONE: {} ok, {} rejected, {} failed",
            summary.succeeded, summary.rejected, summary.failed
        )
        .magenta()
        .bold()
    );
    println!("{banner}");
    summary
}

/// Print the interesting parts of a debug report
pub fn print_report(report: &Value) {
    let enhanced = report["enhanced_query"]
        .as_str()
        .unwrap_or("(no normalized query)");
    println!("{}", "1. Normalized query:".yellow());
    println!("{}\n", enhanced.yellow());

    println!("{}", "2. Filter:".green());
    let filter = serde_json::to_string_pretty(&report["parsed_json"])
        .unwrap_or_else(|_| report["parsed_json"].to_string());
    println!("{}\n", filter.green());

    if let Some(rules) = report["rules_fired"].as_array().filter(|r| !r.is_empty()) {
        println!("{}", "3. Rules fired:".dimmed());
        for rule in rules {
            println!(
                "{}",
                format!(
                    "   {} - {}",
                    rule["rule"].as_str().unwrap_or("?"),
                    rule["detail"].as_str().unwrap_or("")
                )
                .dimmed()
            );
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::cell::Cell;

    #[test]
    fn test_parse_query_file() {
        let content = "\
# comentário
=== Seção 1 ===
notas rodando

  nf 54321
#outra
notas entregues ontem
";
        assert_eq!(
            parse_query_file(content),
            vec!["notas rodando", "nf 54321", "notas entregues ontem"]
        );
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = Cell::new(0);
        let (result, attempts) = with_retries(3, Duration::ZERO, || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 3 {
                    Err(Failure::retryable("rate limited"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let (result, attempts) = with_retries(2, Duration::ZERO, || async {
            Err::<(), _>(Failure::retryable("timeout"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let (result, attempts) = with_retries(5, Duration::ZERO, || async {
            Err::<(), _>(Failure::rejected("vague"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_local_target() {
        let target = Target::Local {
            pipeline: FilterPipeline::rules(),
            ctx: Some(DateContext::for_date(
                NaiveDate::from_ymd_opt(2025, 10, 20).unwrap(),
            )),
        };

        let report = target.debug("notas entregues ontem").await.unwrap();
        assert_eq!(report["parsed_json"]["DE"], "2025-10-19");
        assert_eq!(report["parsed_json"]["TipoData"], "2");

        let failure = target.debug("qual o status da entrega?").await.unwrap_err();
        assert!(!failure.retryable);
    }

    #[tokio::test]
    async fn test_run_counts_outcomes() {
        let target = Target::Local {
            pipeline: FilterPipeline::rules(),
            ctx: None,
        };
        let queries = vec!["nf 54321".to_string(), "qual o status da entrega?".to_string()];
        let options = BatchOptions {
            retries: 1,
            retry_delay: Duration::ZERO,
            delay: Duration::ZERO,
        };

        let summary = run(&target, &queries, &options).await;
        assert_eq!(
            summary,
            BatchSummary {
                succeeded: 1,
                rejected: 1,
                failed: 0
            }
        );
    }
}
