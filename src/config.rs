use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_feed_url")]
    pub feed_url: String,

    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub backfill_enabled: bool,

    #[serde(default = "default_backfill_min_delay")]
    pub backfill_min_delay_secs: u64,

    #[serde(default = "default_backfill_max_delay")]
    pub backfill_max_delay_secs: u64,

    /// When the feed payload cannot be decoded, reconciling an empty batch
    /// would report everything tracked as removed. Off by default: the run
    /// is skipped instead.
    #[serde(default)]
    pub treat_parse_failure_as_empty: bool,

    /// JSON-lines file notifications are appended to. Empty disables it.
    #[serde(default = "default_notify_file")]
    pub notify_file: String,
}

fn default_feed_url() -> String {
    "https://old.reddit.com/r/midsoledeals/search.xml?q=flair%3A%22New%20Balance%22%20OR%20flair%3A%22Adidas%22&restrict_sr=1&sort=new".to_string()
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("feed-watcher");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("tracker.db").to_string_lossy().to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string()
}

fn default_http_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_backfill_min_delay() -> u64 {
    3
}

fn default_backfill_max_delay() -> u64 {
    5
}

fn default_notify_file() -> String {
    "new_posts.jsonl".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_url: default_feed_url(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            http_timeout_secs: default_http_timeout(),
            backfill_enabled: true,
            backfill_min_delay_secs: default_backfill_min_delay(),
            backfill_max_delay_secs: default_backfill_max_delay(),
            treat_parse_failure_as_empty: false,
            notify_file: default_notify_file(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("feed-watcher")
            .join("config.toml")
    }
}
