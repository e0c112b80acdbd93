mod bootstrap;
mod evidence;
mod health;
mod mailer;
pub mod portal;
pub mod presentation;

use std::time::Duration;

use anyhow::Result;
use aquaclaim_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use aquaclaim_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    // Now bootstrap using the same config we already loaded
    let app = bootstrap::bootstrap_with_config(config).await?;

    let router = health::router(app.db_pool.clone())
        .merge(portal::router(
            app.repositories.clone(),
            app.update_service.clone(),
            app.evidence.clone(),
            app.mailer.clone(),
        ))
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "aquaclaim-server started"
    );

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let serve = axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown());

    // The drain is bounded: once the signal lands, in-flight requests get
    // the grace period before the process gives up on them.
    tokio::select! {
        result = serve => result?,
        _ = drain_deadline(grace) => {
            tracing::warn!(
                event_name = "system.server.drain_timeout",
                correlation_id = "shutdown",
                grace_secs = grace.as_secs(),
                "in-flight requests did not drain within the grace period"
            );
        }
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "aquaclaim-server stopping"
    );

    Ok(())
}

async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!(
        event_name = "system.server.shutdown_requested",
        correlation_id = "shutdown",
        "shutdown signal received, draining in-flight requests"
    );
}

async fn drain_deadline(grace: Duration) {
    let _ = tokio::signal::ctrl_c().await;
    tokio::time::sleep(grace).await;
}
