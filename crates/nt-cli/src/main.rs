//! NT CLI - Command-line interface
//!
//! Usage:
//!   nt parse <query>
//!   nt debug <query> [--date AAAA-MM-DD]
//!   nt batch <file> [--endpoint URL]
//!   nt eval <file>

mod batch;
mod eval;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::Colorize;
use nt_core::config::AppConfig;
use nt_core::DateContext;
use nt_pipeline::FilterPipeline;
use tracing_subscriber::EnvFilter;

use crate::batch::{BatchOptions, Target};

#[derive(Parser)]
#[command(name = "nt")]
#[command(about = "Turns Portuguese shipment questions into invoice filters")]
#[command(version)]
struct Cli {
    /// TOML configuration file (environment variables override it);
    /// defaults to `CONFIG_PATH`
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the deterministic pipeline regardless of configuration
    #[arg(long, global = true)]
    rules: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse one query and print the filter
    Parse {
        query: String,
        /// Reference date instead of today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Parse one query and print every intermediate result
    Debug {
        query: String,
        /// Reference date instead of today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Run a file of queries, one per line
    Batch {
        file: PathBuf,
        /// Server base URL; queries run locally when omitted
        #[arg(long)]
        endpoint: Option<String>,
        /// Reference date for local runs
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Extra attempts for a failed query
        #[arg(long, default_value_t = 3)]
        retries: u32,
        /// Wait before retrying a failed query
        #[arg(long, default_value_t = 60_000)]
        retry_delay_ms: u64,
        /// Wait between queries
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,
        /// Per-request timeout against the endpoint
        #[arg(long, default_value_t = 120)]
        timeout_secs: u64,
    },
    /// Score the pipeline against a JSON-lines gold file
    Eval {
        file: PathBuf,
        /// Reference date the gold filters were written for
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Queries parsed concurrently
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
        /// Compare client, carrier and city exactly
        #[arg(long)]
        strict: bool,
        /// Print every mismatch
        #[arg(short, long)]
        verbose: bool,
        /// Fail when the overall F1 score is below this value
        #[arg(long)]
        min_f1: Option<f32>,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)
            .and_then(AppConfig::with_env_override)
            .with_context(|| format!("loading {}", path.display()))?,
        None => AppConfig::from_env().context("loading configuration from environment")?,
    };
    Ok(config)
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("nt_pipeline={0},nt_cli={0}", config.logging.level).into());
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.logging.json_format {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn context_for(date: Option<NaiveDate>) -> DateContext {
    date.map_or_else(DateContext::now, DateContext::for_date)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var_os("CONFIG_PATH").map(PathBuf::from));
    let config = load_config(config_path.as_ref())?;
    init_tracing(&config);

    let pipeline = || -> anyhow::Result<FilterPipeline> {
        if cli.rules {
            Ok(FilterPipeline::rules())
        } else {
            Ok(FilterPipeline::from_config(&config)?)
        }
    };

    match cli.command {
        Commands::Parse { ref query, date } => {
            let filter = pipeline()?.parse_at(query, context_for(date)).await?;
            println!("{}", serde_json::to_string_pretty(&filter)?);
        }
        Commands::Debug { ref query, date } => {
            let report = pipeline()?.debug_at(query, context_for(date)).await?;
            println!("{}", format!("Query: {}", report.query).cyan().bold());
            println!(
                "{}",
                format!("Reference date: {}", report.date_context.today).dimmed()
            );
            if report.repaired {
                println!("{}", "The candidate needed a repair".yellow());
            }
            batch::print_report(&serde_json::to_value(&report)?);
        }
        Commands::Batch {
            ref file,
            ref endpoint,
            date,
            retries,
            retry_delay_ms,
            delay_ms,
            timeout_secs,
        } => {
            let queries = batch::read_query_file(file)?;
            if queries.is_empty() {
                println!(
                    "{}",
                    format!("No queries found in '{}'", file.display()).yellow()
                );
                return Ok(());
            }

            let target = match endpoint {
                Some(endpoint) => Target::remote(endpoint, Duration::from_secs(timeout_secs))?,
                None => Target::Local {
                    pipeline: pipeline()?,
                    ctx: date.map(DateContext::for_date),
                },
            };
            let options = BatchOptions {
                retries,
                retry_delay: Duration::from_millis(retry_delay_ms),
                delay: Duration::from_millis(delay_ms),
            };

            let summary = batch::run(&target, &queries, &options).await;
            if summary.failed > 0 {
                bail!("{} queries failed", summary.failed);
            }
        }
        Commands::Eval {
            ref file,
            date,
            concurrency,
            strict,
            verbose,
            min_f1,
        } => {
            let cases = eval::read_gold(file)?;
            let aggregate = eval::evaluate(
                &pipeline()?,
                &cases,
                context_for(date),
                concurrency,
                strict,
                verbose,
            )
            .await;

            println!("{}", aggregate.report());
            if let Some(min_f1) = min_f1 {
                if !aggregate.meets_threshold(min_f1) {
                    bail!(
                        "overall F1 {:.3} is below {min_f1}",
                        aggregate.overall().f1_score()
                    );
                }
                println!("{}", format!("F1 threshold {min_f1} met").green().bold());
            }
        }
    }

    Ok(())
}
