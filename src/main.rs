use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod github;
mod models;
mod orchestrator;
mod pipeline;
mod routes;
#[cfg(test)]
mod test_support;

use config::Config;
use github::GitHubClient;
use orchestrator::StatsOrchestrator;
use routes::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Invalid configuration")?;
    tracing::info!(
        "Analyzing GitHub account {} ({} private repositories configured)",
        config.username,
        config.private_repos.len()
    );

    let client = GitHubClient::new(&config).context("Failed to build GitHub client")?;
    let stats = Arc::new(StatsOrchestrator::from_config(Arc::new(client), &config));

    // The listing gates every run, so start it before accepting requests
    let loader = Arc::clone(&stats);
    tokio::spawn(async move {
        match loader.load_repositories().await {
            Ok(count) => tracing::info!("Loaded {} repositories", count),
            Err(e) => tracing::error!("Initial repository listing failed: {}", e),
        }
    });

    let app = routes::router(AppState { stats });

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!("Stats service listening on {}", config.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
