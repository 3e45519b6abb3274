//! NT API Server
//!
//! REST server for the tracking query parser.

use anyhow::Context;
use nt_api::{create_router, state::AppState};
use nt_core::config::AppConfig;
use nt_pipeline::FilterPipeline;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let config = match std::env::var("CONFIG_PATH") {
        Ok(path) => AppConfig::from_file(&path)
            .and_then(AppConfig::with_env_override)
            .with_context(|| format!("loading {path}"))?,
        Err(_) => AppConfig::from_env().context("loading configuration from environment")?,
    };

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("nt_api={0},nt_pipeline={0},tower_http=info", config.logging.level).into()
    });
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(config.logging.include_location)
        .with_line_number(config.logging.include_location);
    if config.logging.json_format {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let pipeline = FilterPipeline::from_config(&config)?;
    let addr = format!("{}:{}", config.server.host, config.server.port);

    // Create application state
    let state = Arc::new(AppState::new(config, pipeline));
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("NT API Server starting on http://{}", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
