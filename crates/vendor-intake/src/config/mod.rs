use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::workflows::vendor::applications::{IntakeConfig, UploadPolicy};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }

    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    /// `None` selects the in-memory repository.
    pub database: Option<DatabaseConfig>,
    pub storage: StorageConfig,
    pub mail: MailConfig,
    pub review: ReviewConfig,
    pub outbox: OutboxConfig,
    /// Raw `token=user_id` pairs for the static identity table.
    pub api_tokens: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(&var_or("APP_ENV", "development"));

        let host = var_or("APP_HOST", "127.0.0.1");
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = var_or("APP_LOG_LEVEL", "info");

        let database = match optional_var("DATABASE_URL") {
            Some(url) => Some(DatabaseConfig {
                url,
                max_connections: parsed_var("DATABASE_MAX_CONNECTIONS", 10)?,
            }),
            None => None,
        };

        let storage = StorageConfig {
            url: optional_var("STORAGE_URL"),
            service_key: optional_var("STORAGE_SERVICE_KEY"),
            bucket: var_or("STORAGE_BUCKET", "vendor-documents"),
            max_upload_bytes: parsed_var("MAX_UPLOAD_SIZE", 5_242_880)?,
            allowed_extensions: split_list(&var_or("ALLOWED_EXTENSIONS", "pdf,jpg,jpeg,png")),
            upload_timeout: seconds_var("STORAGE_UPLOAD_TIMEOUT_SECS", 30)?,
            request_timeout: seconds_var("STORAGE_REQUEST_TIMEOUT_SECS", 10)?,
            signed_url_ttl: seconds_var("SIGNED_URL_TTL_SECS", 3600)?,
        };

        let mail = MailConfig {
            api_key: optional_var("MAIL_API_KEY"),
            api_url: var_or("MAIL_API_URL", "https://api.sendgrid.com/v3/mail/send"),
            from_address: var_or("FROM_EMAIL", "noreply@example.com"),
            admin_addresses: split_list(&var_or("ADMIN_EMAILS", "")),
            timeout: seconds_var("NOTIFIER_TIMEOUT_SECS", 10)?,
        };

        let default_commission_rate: f64 = parsed_var("DEFAULT_COMMISSION_RATE", 10.0)?;
        if !(0.0..=50.0).contains(&default_commission_rate) {
            return Err(ConfigError::InvalidValue {
                key: "DEFAULT_COMMISSION_RATE",
                value: default_commission_rate.to_string(),
            });
        }

        let review = ReviewConfig {
            default_commission_rate,
            frontend_origin: var_or("FRONTEND_ORIGIN", "http://localhost:4321"),
        };

        let outbox = OutboxConfig {
            poll_interval: seconds_var("OUTBOX_POLL_SECS", 30)?,
            max_attempts: parsed_var("OUTBOX_MAX_ATTEMPTS", 5)?,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            database,
            storage,
            mail,
            review,
            outbox,
            api_tokens: optional_var("API_TOKENS"),
        })
    }

    /// Settings handed to the review service.
    pub fn intake(&self) -> IntakeConfig {
        IntakeConfig {
            default_commission_rate: self.review.default_commission_rate,
            admin_addresses: self.mail.admin_addresses.clone(),
            upload_policy: UploadPolicy::new(
                self.storage.max_upload_bytes,
                &self.storage.allowed_extensions,
            ),
            upload_timeout: self.storage.upload_timeout,
            storage_timeout: self.storage.request_timeout,
            signed_url_ttl: self.storage.signed_url_ttl,
        }
    }

    /// The configured frontend plus the local development ports.
    pub fn allowed_origins(&self) -> Vec<String> {
        let mut origins = vec![self.review.frontend_origin.clone()];
        for local in ["http://localhost:3000", "http://localhost:4321"] {
            if !origins.iter().any(|origin| origin == local) {
                origins.push(local.to_string());
            }
        }
        origins
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Object storage endpoint and upload limits.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub url: Option<String>,
    pub service_key: Option<String>,
    pub bucket: String,
    pub max_upload_bytes: u64,
    pub allowed_extensions: Vec<String>,
    pub upload_timeout: Duration,
    pub request_timeout: Duration,
    pub signed_url_ttl: Duration,
}

impl StorageConfig {
    /// Endpoint and key, when both are set. Otherwise documents stay in memory.
    pub fn remote(&self) -> Option<(&str, &str)> {
        match (&self.url, &self.service_key) {
            (Some(url), Some(key)) => Some((url.as_str(), key.as_str())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    /// Without a key messages are only logged.
    pub api_key: Option<String>,
    pub api_url: String,
    pub from_address: String,
    pub admin_addresses: Vec<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ReviewConfig {
    pub default_commission_rate: f64,
    pub frontend_origin: String,
}

#[derive(Debug, Clone)]
pub struct OutboxConfig {
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidValue { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "{key} has an invalid value '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidValue { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parsed_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match optional_var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        None => Ok(default),
    }
}

fn seconds_var(key: &'static str, default: u64) -> Result<Duration, ConfigError> {
    parsed_var(key, default).map(Duration::from_secs)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_ascii_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}
