use chrono_tz::Tz;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Source(#[from] config::ConfigError),

    #[error("{0}")]
    Invalid(String),
}

// Top-level configuration, split into sections
#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub admin: AdminConfig,
}

// Application settings
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    pub log_format: LogFormat,
    pub time_zone: Tz,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

// Database settings
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: StorageBackend,
    pub url: Option<String>,
    pub pool_size: u32,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub bcrypt_cost: u32,
}

// Staff account created at startup when both fields are set
#[derive(Debug, Clone, Default)]
pub struct AdminConfig {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Flat view of the environment, one field per variable.
#[derive(Debug, Deserialize)]
struct Settings {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_environment")]
    environment: String,
    #[serde(default = "default_rust_log")]
    rust_log: String,
    #[serde(default)]
    log_format: Option<String>,
    #[serde(default = "default_time_zone")]
    time_zone: String,
    #[serde(default)]
    storage_backend: Option<String>,
    #[serde(default)]
    database_url: Option<String>,
    #[serde(default = "default_pool_size")]
    db_pool_size: u32,
    #[serde(default = "default_bcrypt_cost")]
    bcrypt_cost: u32,
    #[serde(default)]
    admin_username: Option<String>,
    #[serde(default)]
    admin_password: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_rust_log() -> String {
    "bus_booking=debug,tower_http=debug".to_string()
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

fn default_pool_size() -> u32 {
    20
}

fn default_bcrypt_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(config::Environment::default())
    }

    /// Builds the configuration from an environment source. Variable names
    /// are matched case-insensitively (`DATABASE_URL`, `PORT`, ...).
    pub fn load(env: config::Environment) -> Result<Self, ConfigError> {
        let settings: Settings = config::Config::builder()
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()?;

        let log_format = match settings.log_format.as_deref() {
            None | Some("") | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid(format!(
                    "LOG_FORMAT must be pretty or json, got {}",
                    other
                )))
            }
        };

        let time_zone: Tz = settings.time_zone.parse().map_err(|_| {
            ConfigError::Invalid(format!("TIME_ZONE {} is not a known time zone", settings.time_zone))
        })?;

        let backend = match settings.storage_backend.as_deref() {
            None | Some("") | Some("postgres") => StorageBackend::Postgres,
            Some("memory") => StorageBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid(format!(
                    "STORAGE_BACKEND must be postgres or memory, got {}",
                    other
                )))
            }
        };

        let url = settings.database_url.filter(|u| !u.is_empty());
        if backend == StorageBackend::Postgres && url.is_none() {
            return Err(ConfigError::Invalid(
                "DATABASE_URL must be set for the postgres backend".to_string(),
            ));
        }

        if !(4..=31).contains(&settings.bcrypt_cost) {
            return Err(ConfigError::Invalid(format!(
                "BCRYPT_COST must be between 4 and 31, got {}",
                settings.bcrypt_cost
            )));
        }

        Ok(Config {
            app: AppConfig {
                host: settings.host,
                port: settings.port,
                environment: settings.environment,
                rust_log: settings.rust_log,
                log_format,
                time_zone,
            },
            database: DatabaseConfig {
                backend,
                url,
                pool_size: settings.db_pool_size,
            },
            auth: AuthConfig {
                bcrypt_cost: settings.bcrypt_cost,
            },
            admin: AdminConfig {
                username: settings.admin_username.filter(|u| !u.is_empty()),
                password: settings.admin_password.filter(|p| !p.is_empty()),
            },
        })
    }

    /// In-memory configuration for tests and local experiments.
    pub fn in_memory() -> Self {
        Config {
            app: AppConfig {
                host: default_host(),
                port: default_port(),
                environment: "test".to_string(),
                rust_log: default_rust_log(),
                log_format: LogFormat::Pretty,
                time_zone: Tz::UTC,
            },
            database: DatabaseConfig {
                backend: StorageBackend::Memory,
                url: None,
                pool_size: default_pool_size(),
            },
            auth: AuthConfig { bcrypt_cost: 4 },
            admin: AdminConfig::default(),
        }
    }
}
