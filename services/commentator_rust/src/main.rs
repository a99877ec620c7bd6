use std::time::Duration;

use anyhow::{Context, Result};
use commentary_core::clients::http_client;
use commentary_core::OutputSink;
use commentator_rust::config::CommentatorConfig;
use commentator_rust::runtime;
use dotenv::dotenv;
use futures_util::future::join_all;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let config = CommentatorConfig::from_env().context("Invalid configuration")?;

    // Initialize logging (RUST_LOG wins over LOG_LEVEL)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!("Starting Commentator Service...");
    info!(
        games = ?config.game_ids,
        sport = config.sport.as_str(),
        provider = ?config.stats_provider,
        interval_secs = config.update_interval.as_secs(),
        output = %config.output_dir.display(),
        "Configuration loaded"
    );

    let sink = OutputSink::open(&config.output_dir)
        .await
        .with_context(|| format!("Failed to open output dir {}", config.output_dir.display()))?;

    let listing = runtime::stats_source(&config, http_client(Duration::from_secs(10)));
    let game_ids = runtime::resolve_game_ids(&config, listing.as_ref()).await?;

    runtime::check_voices(&config).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut tasks = Vec::new();
    for game_id in &game_ids {
        let pipeline = runtime::build_pipeline(&config, game_id, sink.clone());
        tasks.push(tokio::spawn(pipeline.run(shutdown_rx.clone())));
    }

    let janitor = config.artifact_max_age.map(|max_age| {
        tokio::spawn(runtime::run_janitor(
            sink.clone(),
            max_age,
            shutdown_rx.clone(),
        ))
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested, draining pipelines...");
    let _ = shutdown_tx.send(true);

    for result in join_all(tasks).await {
        match result {
            Ok(report) => info!(
                report = %serde_json::to_string(&report).unwrap_or_default(),
                "Pipeline report"
            ),
            Err(e) => error!("Pipeline task panicked: {}", e),
        }
    }
    if let Some(janitor) = janitor {
        let _ = janitor.await;
    }

    info!("Commentator Service stopped");
    Ok(())
}
