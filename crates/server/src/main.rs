mod admin;
mod bootstrap;
mod checkout;
mod dashboard;
mod email;
mod error;
mod health;
mod payments;
mod state;
#[cfg(test)]
mod test_support;

use std::time::Duration;

use anyhow::Result;
use axum::Router;
use storefront_core::config::{AppConfig, LoadOptions};
use tokio::sync::oneshot;

use crate::state::AppState;

fn init_logging(config: &AppConfig) {
    use storefront_core::config::LogFormat::*;
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

/// Every storefront route on one router.
pub fn app(state: AppState, health: Router) -> Router {
    Router::new()
        .merge(health)
        .merge(checkout::router(state.clone()))
        .merge(admin::router(state.clone()))
        .merge(dashboard::router(state))
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging must be live before bootstrap emits its events.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app_handle = bootstrap::bootstrap_with_config(config).await?;
    let config = app_handle.config;
    let health = health::router(
        app_handle.db_pool.clone(),
        config.payments.secret_key.is_some(),
        config.email.api_key.is_some(),
    );

    let address = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "storefront-server listening"
    );

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let router = app(app_handle.state, health);
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        grace_secs = config.server.graceful_shutdown_secs,
        "storefront-server draining in-flight requests"
    );
    let _ = stop_tx.send(());

    let grace = Duration::from_secs(config.server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, server).await {
        Ok(joined) => joined??,
        Err(_) => tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            "graceful shutdown window elapsed with requests still in flight"
        ),
    }

    app_handle.db_pool.close().await;
    tracing::info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        "storefront-server stopped"
    );
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
