//! # rq-config
//!
//! Layered settings: built-in defaults, then an optional
//! `config/rusty-qa.toml`, then `RUSTY_QA__SECTION__KEY` environment
//! variables (a `.env` file is honored).

use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File, FileFormat};
use rq_core::pipeline::{PipelineOptions, SelfMentionPolicy};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

pub const ENV_PREFIX: &str = "RUSTY_QA";
pub const DEFAULT_CONFIG_FILE: &str = "config/rusty-qa";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

fn secret<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SecretString, D::Error> {
    String::deserialize(deserializer).map(SecretString::from)
}

#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    #[serde(deserialize_with = "secret")]
    pub url: SecretString,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentSettings {
    pub summary_length: usize,
    pub self_mentions: SelfMentionPolicy,
    pub profile_url_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PingSettings {
    pub enabled: bool,
    pub endpoint: String,
    pub sitemap_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub log: LogSettings,
    pub content: ContentSettings,
    pub ping: PingSettings,
}

fn with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(config::Config::builder()
        .set_default("database.url", "sqlite://rusty-qa.db")?
        .set_default("log.level", "info")?
        .set_default("log.format", "pretty")?
        .set_default("content.summary_length", 120)?
        .set_default("content.self_mentions", "ignore")?
        .set_default("content.profile_url_prefix", "/users/")?
        .set_default("ping.enabled", false)?
        .set_default(
            "ping.endpoint",
            "https://www.google.com/webmasters/tools/ping",
        )?
        .set_default("ping.sitemap_url", "http://localhost/sitemap.xml")?
        .set_default("ping.timeout_secs", 5)?)
}

impl Settings {
    /// Reads `.env`, the optional config file and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let settings: Settings = with_defaults()?
            .add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        tracing::debug!(format = ?settings.log.format, ping = settings.ping.enabled, "settings loaded");
        Ok(settings)
    }

    /// Defaults overlaid with a TOML document. Ignores the environment.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let settings: Settings = with_defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.content.summary_length == 0 {
            return Err(ConfigError::Invalid {
                key: "content.summary_length",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.ping.enabled && self.ping.sitemap_url.is_empty() {
            return Err(ConfigError::Invalid {
                key: "ping.sitemap_url",
                reason: "required when ping.enabled is true".to_string(),
            });
        }
        if self.ping.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "ping.timeout_secs",
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            summary_length: self.content.summary_length,
            self_mentions: self.content.self_mentions,
            profile_url_prefix: self.content.profile_url_prefix.clone(),
        }
    }
}
