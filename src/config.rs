//! Application configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_with::serde_as;
use tracing::warn;

use crate::errors::SightingError;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub media: MediaConfig,
    pub subscribers: SubscriberConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Socket address to listen on, e.g. `0.0.0.0:8000`
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// SQLite connection URL, e.g. `sqlite://sightings.db`
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MediaConfig {
    /// Directory uploaded photos and videos are written to
    pub upload_dir: PathBuf,
    /// Largest accepted upload body in bytes
    pub max_upload_bytes: usize,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct SubscriberConfig {
    /// Messages buffered per subscriber before sends start to wait
    pub channel_capacity: usize,
    /// Time a single delivery may take before the subscriber is dropped
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub send_timeout: Duration,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.bind", "0.0.0.0:8000")?
            .set_default("database.url", "sqlite://sightings.db")?
            .set_default("database.max_connections", 5)?
            .set_default("media.upload_dir", "static/uploads")?
            .set_default("media.max_upload_bytes", 50 * 1024 * 1024)?
            .set_default("subscribers.channel_capacity", 32)?
            .set_default("subscribers.send_timeout", 2000)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix("SIGHTINGS")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate all sections
    pub fn validate(&self) -> Result<(), SightingError> {
        self.server.validate()?;
        self.database.validate()?;
        self.media.validate()?;
        self.subscribers.validate()?;
        Ok(())
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), SightingError> {
        self.bind
            .parse::<std::net::SocketAddr>()
            .map_err(|e| SightingError::ConfigurationError {
                message: format!("Invalid bind address '{}': {}", self.bind, e),
            })?;
        Ok(())
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), SightingError> {
        if !self.url.starts_with("sqlite:") {
            return Err(SightingError::ConfigurationError {
                message: format!("Database URL must be a sqlite: URL, got '{}'", self.url),
            });
        }
        if self.max_connections == 0 {
            return Err(SightingError::ConfigurationError {
                message: "Database max_connections must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

impl MediaConfig {
    /// Validate configuration parameters and create the upload directory
    pub fn validate(&self) -> Result<(), SightingError> {
        self.validate_upload_dir()?;
        if self.max_upload_bytes == 0 {
            return Err(SightingError::ConfigurationError {
                message: "Maximum upload size must be greater than zero".to_string(),
            });
        }
        self.ensure_directory_exists(&self.upload_dir)?;
        Ok(())
    }

    fn validate_upload_dir(&self) -> Result<(), SightingError> {
        if self.upload_dir.as_os_str().is_empty() {
            return Err(SightingError::ConfigurationError {
                message: "Upload directory cannot be empty".to_string(),
            });
        }
        Ok(())
    }

    fn ensure_directory_exists(&self, dir: &Path) -> Result<(), SightingError> {
        if !dir.exists() {
            warn!("Upload directory does not exist, attempting to create it");
            std::fs::create_dir_all(dir).map_err(|e| SightingError::ConfigurationError {
                message: format!("Could not create upload directory: {}", e),
            })?;
        }
        Ok(())
    }
}

impl SubscriberConfig {
    pub fn validate(&self) -> Result<(), SightingError> {
        if self.channel_capacity == 0 {
            return Err(SightingError::ConfigurationError {
                message: "Subscriber channel capacity must be greater than zero".to_string(),
            });
        }
        if self.send_timeout.is_zero() {
            return Err(SightingError::ConfigurationError {
                message: "Subscriber send timeout must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
