//! # configs
//!
//! Layered settings: built-in defaults, then `config/default.toml`, then
//! `config/local.toml`, then `QNA__`-prefixed environment variables
//! (`QNA__DATABASE__URL`, `QNA__MODERATION__THRESHOLD`, ...). A `.env` file
//! is loaded into the environment first when present.

use std::path::PathBuf;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const ENV_PREFIX: &str = "QNA";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub recovery: RecoverySettings,
    pub moderation: ModerationSettings,
    pub media: MediaSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: SecretString,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    /// HS256 key for anonymous session tokens
    pub jwt_secret: SecretString,
    pub session_ttl_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecoverySettings {
    /// HMAC key for recovery code hashes. Rotating it invalidates every issued code.
    pub pepper: SecretString,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModerationPolicyKind {
    /// Hide once the raw report count reaches the threshold
    Fixed,
    /// Hide once reporter tier weights sum to the threshold
    TrustWeighted,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ModerationSettings {
    pub policy: ModerationPolicyKind,
    pub threshold: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaSettings {
    pub root: PathBuf,
    pub sweep_interval_secs: u64,
    pub sweep_batch: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

/// Built-in defaults. Secrets have none and must be supplied.
fn with_defaults(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
    builder
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8080)?
        .set_default("database.max_connections", 10)?
        .set_default("auth.session_ttl_days", 30)?
        .set_default("moderation.policy", "fixed")?
        .set_default("moderation.threshold", 3)?
        .set_default("media.root", "./data/uploads")?
        .set_default("media.sweep_interval_secs", 300)?
        .set_default("media.sweep_batch", 200)?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "compact")
}

impl Settings {
    /// Loads `.env`, the config files and the environment, then validates.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }

        let config = with_defaults(Config::builder())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let secrets = [
            ("database.url", &self.database.url),
            ("auth.jwt_secret", &self.auth.jwt_secret),
            ("recovery.pepper", &self.recovery.pepper),
        ];
        for (key, secret) in secrets {
            if secret.expose_secret().trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{key} must not be empty")));
            }
        }
        if self.moderation.threshold == 0 {
            return Err(ConfigError::Invalid(
                "moderation.threshold must be at least 1".into(),
            ));
        }
        if self.auth.session_ttl_days <= 0 {
            return Err(ConfigError::Invalid(
                "auth.session_ttl_days must be positive".into(),
            ));
        }
        if self.database.max_connections == 0 || self.media.sweep_batch == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections and media.sweep_batch must be positive".into(),
            ));
        }
        Ok(())
    }
}
