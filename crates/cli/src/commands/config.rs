use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use storefront_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, env_key, value) in effective_values(&config) {
        let source =
            field_source(key, env_key, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }

    lines.join("\n")
}

/// Every reported key with its env override name and display value.
fn effective_values(config: &AppConfig) -> Vec<(&'static str, &'static str, String)> {
    vec![
        ("database.url", "STOREFRONT_DATABASE_URL", config.database.url.clone()),
        (
            "database.max_connections",
            "STOREFRONT_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        (
            "database.timeout_secs",
            "STOREFRONT_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        (
            "server.bind_address",
            "STOREFRONT_SERVER_BIND_ADDRESS",
            config.server.bind_address.clone(),
        ),
        ("server.port", "STOREFRONT_SERVER_PORT", config.server.port.to_string()),
        ("server.public_url", "STOREFRONT_SERVER_PUBLIC_URL", config.server.public_url.clone()),
        (
            "server.graceful_shutdown_secs",
            "STOREFRONT_SERVER_GRACEFUL_SHUTDOWN_SECS",
            config.server.graceful_shutdown_secs.to_string(),
        ),
        (
            "payments.secret_key",
            "STOREFRONT_PAYMENTS_SECRET_KEY",
            redact_secret(config.payments.secret_key.as_ref()),
        ),
        (
            "payments.api_base_url",
            "STOREFRONT_PAYMENTS_API_BASE_URL",
            config.payments.api_base_url.clone(),
        ),
        ("payments.currency", "STOREFRONT_PAYMENTS_CURRENCY", config.payments.currency.clone()),
        (
            "payments.timeout_secs",
            "STOREFRONT_PAYMENTS_TIMEOUT_SECS",
            config.payments.timeout_secs.to_string(),
        ),
        ("email.api_key", "STOREFRONT_EMAIL_API_KEY", redact_secret(config.email.api_key.as_ref())),
        ("email.api_base_url", "STOREFRONT_EMAIL_API_BASE_URL", config.email.api_base_url.clone()),
        ("email.sender", "STOREFRONT_EMAIL_SENDER", config.email.sender.clone()),
        (
            "downloads.verification_ttl_hours",
            "STOREFRONT_DOWNLOADS_VERIFICATION_TTL_HOURS",
            config.downloads.verification_ttl_hours.to_string(),
        ),
        ("logging.level", "STOREFRONT_LOGGING_LEVEL", config.logging.level.clone()),
        ("logging.format", "STOREFRONT_LOGGING_FORMAT", format!("{:?}", config.logging.format)),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("storefront.toml"), PathBuf::from("config/storefront.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps the key prefix (`sk_test`, `re`) so operators can tell keys apart.
fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.rsplit_once('_') {
        Some((prefix, _)) => format!("{prefix}_***"),
        None => "<redacted>".to_string(),
    }
}
