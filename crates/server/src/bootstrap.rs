use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use secrecy::SecretString;
use storefront_core::config::{AppConfig, ConfigError, LoadOptions};
use storefront_db::{connect_with_config, migrations, DbPool};
use thiserror::Error;
use tracing::info;

use crate::email::HttpMailer;
use crate::payments::StripeGateway;
use crate::state::{AppState, StoreSettings};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("email templates failed to load: {0}")]
    Templates(#[source] tera::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Connects, migrates and wires providers for an already loaded config.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting storefront bootstrap"
    );
    config.require_integrations()?;

    let db_pool = connect_with_config(&config.database)
        .await
        .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let client = Client::builder()
        .timeout(Duration::from_secs(config.payments.timeout_secs))
        .build()
        .map_err(BootstrapError::HttpClient)?;
    let payments = StripeGateway::new(
        client.clone(),
        &config.payments.api_base_url,
        required_secret(config.payments.secret_key.as_ref(), "payments.secret_key")?,
    );
    let mailer = HttpMailer::new(
        client,
        &config.email.api_base_url,
        required_secret(config.email.api_key.as_ref(), "email.api_key")?,
    );

    let state = AppState::from_pool(
        db_pool.clone(),
        Arc::new(payments),
        Arc::new(mailer),
        StoreSettings::from(&config),
    )
    .map_err(BootstrapError::Templates)?;
    info!(
        event_name = "system.bootstrap.providers_ready",
        correlation_id = "bootstrap",
        payments_base_url = %config.payments.api_base_url,
        email_base_url = %config.email.api_base_url,
        "payment and email providers configured"
    );

    Ok(Application { config, db_pool, state })
}

fn required_secret(
    secret: Option<&SecretString>,
    key: &str,
) -> Result<SecretString, BootstrapError> {
    secret
        .cloned()
        .ok_or_else(|| ConfigError::Validation(format!("{key} is required")).into())
}
