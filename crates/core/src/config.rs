use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::download::DEFAULT_VERIFICATION_TTL_HOURS;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub payments: PaymentsConfig,
    pub email: EmailConfig,
    pub downloads: DownloadsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Base URL used for links in outbound email.
    pub public_url: String,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PaymentsConfig {
    pub secret_key: Option<SecretString>,
    pub api_base_url: String,
    pub currency: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct EmailConfig {
    pub api_key: Option<SecretString>,
    pub api_base_url: String,
    pub sender: String,
}

#[derive(Clone, Debug)]
pub struct DownloadsConfig {
    pub verification_ttl_hours: i64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub server_port: Option<u16>,
    pub payments_secret_key: Option<String>,
    pub email_api_key: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://storefront.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 3000,
                public_url: "http://localhost:3000".to_string(),
                graceful_shutdown_secs: 15,
            },
            payments: PaymentsConfig {
                secret_key: None,
                api_base_url: "https://api.stripe.com".to_string(),
                currency: "usd".to_string(),
                timeout_secs: 30,
            },
            email: EmailConfig {
                api_key: None,
                api_base_url: "https://api.resend.com".to_string(),
                sender: "Storefront <support@storefront.local>".to_string(),
            },
            downloads: DownloadsConfig { verification_ttl_hours: DEFAULT_VERIFICATION_TTL_HOURS },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("storefront.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(public_url) = server.public_url {
                self.server.public_url = public_url;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(payments) = patch.payments {
            if let Some(secret_key) = payments.secret_key {
                self.payments.secret_key = Some(secret_value(secret_key));
            }
            if let Some(api_base_url) = payments.api_base_url {
                self.payments.api_base_url = api_base_url;
            }
            if let Some(currency) = payments.currency {
                self.payments.currency = currency;
            }
            if let Some(timeout_secs) = payments.timeout_secs {
                self.payments.timeout_secs = timeout_secs;
            }
        }

        if let Some(email) = patch.email {
            if let Some(api_key) = email.api_key {
                self.email.api_key = Some(secret_value(api_key));
            }
            if let Some(api_base_url) = email.api_base_url {
                self.email.api_base_url = api_base_url;
            }
            if let Some(sender) = email.sender {
                self.email.sender = sender;
            }
        }

        if let Some(downloads) = patch.downloads {
            if let Some(verification_ttl_hours) = downloads.verification_ttl_hours {
                self.downloads.verification_ttl_hours = verification_ttl_hours;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("STOREFRONT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("STOREFRONT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_number("STOREFRONT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("STOREFRONT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_number("STOREFRONT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("STOREFRONT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("STOREFRONT_SERVER_PORT") {
            self.server.port = parse_number("STOREFRONT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("STOREFRONT_SERVER_PUBLIC_URL") {
            self.server.public_url = value;
        }
        if let Some(value) = read_env("STOREFRONT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_number("STOREFRONT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("STOREFRONT_PAYMENTS_SECRET_KEY") {
            self.payments.secret_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("STOREFRONT_PAYMENTS_API_BASE_URL") {
            self.payments.api_base_url = value;
        }
        if let Some(value) = read_env("STOREFRONT_PAYMENTS_CURRENCY") {
            self.payments.currency = value;
        }
        if let Some(value) = read_env("STOREFRONT_PAYMENTS_TIMEOUT_SECS") {
            self.payments.timeout_secs = parse_number("STOREFRONT_PAYMENTS_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("STOREFRONT_EMAIL_API_KEY") {
            self.email.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("STOREFRONT_EMAIL_API_BASE_URL") {
            self.email.api_base_url = value;
        }
        if let Some(value) = read_env("STOREFRONT_EMAIL_SENDER") {
            self.email.sender = value;
        }

        if let Some(value) = read_env("STOREFRONT_DOWNLOADS_VERIFICATION_TTL_HOURS") {
            self.downloads.verification_ttl_hours =
                parse_number("STOREFRONT_DOWNLOADS_VERIFICATION_TTL_HOURS", &value)?;
        }

        let log_level =
            read_env("STOREFRONT_LOGGING_LEVEL").or_else(|| read_env("STOREFRONT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("STOREFRONT_LOGGING_FORMAT").or_else(|| read_env("STOREFRONT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(secret_key) = overrides.payments_secret_key {
            self.payments.secret_key = Some(secret_value(secret_key));
        }
        if let Some(api_key) = overrides.email_api_key {
            self.email.api_key = Some(secret_value(api_key));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_payments(&self.payments)?;
        validate_email(&self.email)?;
        validate_downloads(&self.downloads)?;
        validate_logging(&self.logging)?;
        Ok(())
    }

    /// Checks the credentials the HTTP service needs but offline commands do not.
    pub fn require_integrations(&self) -> Result<(), ConfigError> {
        if !has_secret(self.payments.secret_key.as_ref()) {
            return Err(ConfigError::Validation(
                "payments.secret_key is required to serve checkout. \
                 Set STOREFRONT_PAYMENTS_SECRET_KEY to your `sk_...` key"
                    .to_string(),
            ));
        }
        if !has_secret(self.email.api_key.as_ref()) {
            return Err(ConfigError::Validation(
                "email.api_key is required to send order history emails. \
                 Set STOREFRONT_EMAIL_API_KEY"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

fn has_secret(secret: Option<&SecretString>) -> bool {
    secret.map(|value| !value.expose_secret().trim().is_empty()).unwrap_or(false)
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("storefront.toml"), PathBuf::from("config/storefront.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if !is_http_url(&server.public_url) {
        return Err(ConfigError::Validation(
            "server.public_url must start with http:// or https://".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_payments(payments: &PaymentsConfig) -> Result<(), ConfigError> {
    if let Some(secret_key) = &payments.secret_key {
        let secret_key = secret_key.expose_secret();
        if !secret_key.starts_with("sk_") {
            let hint = if secret_key.starts_with("pk_") {
                " (hint: you may have used the publishable key instead of the secret key)"
            } else {
                ""
            };
            return Err(ConfigError::Validation(format!(
                "payments.secret_key must start with `sk_`{hint}"
            )));
        }
    }

    if !is_http_url(&payments.api_base_url) {
        return Err(ConfigError::Validation(
            "payments.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    let currency = payments.currency.trim();
    if currency.len() != 3 || !currency.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return Err(ConfigError::Validation(
            "payments.currency must be a three-letter ISO currency code such as `usd`".to_string(),
        ));
    }

    if payments.timeout_secs == 0 || payments.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "payments.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_email(email: &EmailConfig) -> Result<(), ConfigError> {
    if !is_http_url(&email.api_base_url) {
        return Err(ConfigError::Validation(
            "email.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    if !email.sender.contains('@') {
        return Err(ConfigError::Validation(
            "email.sender must contain an email address, e.g. `Shop <support@example.com>`"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_downloads(downloads: &DownloadsConfig) -> Result<(), ConfigError> {
    if downloads.verification_ttl_hours <= 0 {
        return Err(ConfigError::Validation(
            "downloads.verification_ttl_hours must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    payments: Option<PaymentsPatch>,
    email: Option<EmailPatch>,
    downloads: Option<DownloadsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    public_url: Option<String>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PaymentsPatch {
    secret_key: Option<String>,
    api_base_url: Option<String>,
    currency: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EmailPatch {
    api_key: Option<String>,
    api_base_url: Option<String>,
    sender: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DownloadsPatch {
    verification_ttl_hours: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
