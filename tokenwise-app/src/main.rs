//! TokenWise operator console
//!
//! Streams transactions for the monitored token, keeps the dashboard in sync
//! and serves a line-based console for drilling into holders and wallets.

mod console;
mod render;

use std::sync::Arc;

use tokenwise_client::{ApiClient, ClientConfig, TransactionStream};
use tokenwise_core::MONITORED_TOKEN;
use tokenwise_services::{EngineConfig, SyncEngine, ViewController};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env.local file
    if let Err(e) = dotenvy::from_filename(".env.local") {
        // Not an error if the file doesn't exist
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env.local: {}", e);
        }
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tokenwise_app=debug")),
        )
        .init();

    info!("Starting TokenWise (token {})", MONITORED_TOKEN);

    let client_config = ClientConfig::from_env()?;
    let engine_config = EngineConfig::from_env();
    info!("Backend: {}", client_config.backend_url());
    if let Some(interval) = engine_config.min_refresh_interval {
        info!("Stream-triggered dashboard refreshes spaced by {:?}", interval);
    }

    let api_client = Arc::new(ApiClient::new(&client_config)?);
    let (engine, events) = SyncEngine::new(engine_config, api_client);
    let controller = ViewController::new(engine.clone());

    // Stream -> engine
    let (mut stream, updates) = TransactionStream::new(&client_config);
    let engine_task = tokio::spawn(engine.clone().run(updates));
    tokio::spawn(render::log_events(engine.clone(), events));
    stream.start();

    controller.initial_load().await;
    render::print_lines(&render::render_view(&engine.view()));

    let start_monitoring = std::env::var("TOKENWISE_START_MONITORING")
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false);
    if start_monitoring {
        controller.start_monitoring().await;
    }

    tokio::select! {
        result = console::run(controller.clone(), &stream) => result?,
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C"),
    }

    info!("Shutting down");
    stream.shutdown().await;
    drop(stream);
    let _ = engine_task.await;

    Ok(())
}
