use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::aggregate::{AggregateSettings, LimitMode};
use crate::error::{AppError, Result};

const API_KEY_ENV: &str = "YOUTUBE_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    pub youtube_api_key: Option<String>,

    /// Identity used by the CLI when `--user` is not given.
    pub user: Option<String>,

    #[serde(default = "default_video_limit")]
    pub video_limit: usize,

    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_aggregate_deadline")]
    pub aggregate_deadline_secs: u64,

    #[serde(default)]
    pub limit_mode: LimitMode,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tubefeed");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("tubefeed.db").to_string_lossy().to_string()
}

fn default_video_limit() -> usize {
    10
}

fn default_max_concurrent_fetches() -> usize {
    5
}

fn default_fetch_timeout() -> u64 {
    15
}

fn default_aggregate_deadline() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            youtube_api_key: None,
            user: None,
            video_limit: default_video_limit(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            fetch_timeout_secs: default_fetch_timeout(),
            aggregate_deadline_secs: default_aggregate_deadline(),
            limit_mode: LimitMode::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::parse(&content)?
        } else {
            let config = Config::default();
            config.save()?;
            config
        };

        Ok(config.with_env_overrides())
    }

    fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.video_limit == 0 {
            return Err(AppError::Config("video_limit must be at least 1".to_string()));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(AppError::Config(
                "max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        if self.fetch_timeout_secs == 0 || self.aggregate_deadline_secs == 0 {
            return Err(AppError::Config(
                "fetch_timeout_secs and aggregate_deadline_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                self.youtube_api_key = Some(key);
            }
        }
        self
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tubefeed")
            .join("config.toml")
    }

    pub fn aggregate_settings(&self) -> AggregateSettings {
        AggregateSettings {
            max_concurrent: self.max_concurrent_fetches,
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            deadline: Duration::from_secs(self.aggregate_deadline_secs),
            limit_mode: self.limit_mode,
        }
    }
}
