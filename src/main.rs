use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat_archive_bot::server::{self, AppState};
use chat_archive_bot::{Config, Pipeline};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("invalid configuration")?;
    tracing::info!("Archive repository: {}", config.repository.url);
    tracing::info!(
        "Slack tokens present (app: {}, bot: {}), request signing: {}",
        !config.slack.app_token.is_empty(),
        !config.slack.bot_token.is_empty(),
        config.slack.signing_secret.is_some()
    );
    if config.push_conflict_retries == 0 {
        tracing::info!("Push conflicts are reported, not retried");
    } else {
        tracing::info!(
            "Push conflicts are retried up to {} times",
            config.push_conflict_retries
        );
    }

    let addr = config.bind_address.clone();
    let pipeline = Arc::new(Pipeline::new(Arc::new(config)));
    let app = server::router(AppState { pipeline });

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Archive bot listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
