use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    diff::ChangeThresholds,
    error::{PulseError, Result},
    score::{ScoreWeights, TrendThresholds},
};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_EVENTS_PER_BATCH: usize = 5;

const DEFAULT_REPOSITORIES: &[&str] = &[
    "pathwaycom/pathway",
    "fastapi/fastapi",
    "langchain-ai/langchain",
    "openai/openai-python",
    "microsoft/vscode",
];

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_heartbeat_interval() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_SECS
}

fn default_events_per_batch() -> usize {
    DEFAULT_EVENTS_PER_BATCH
}

fn default_repositories() -> Vec<String> {
    DEFAULT_REPOSITORIES.iter().map(|s| s.to_string()).collect()
}

fn default_demo_mode() -> bool {
    false
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Seconds between ingestion/aggregation/broadcast cycles.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Seconds between keepalive messages to each live subscriber.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    /// Repositories tracked by the event source.
    #[serde(default = "default_repositories")]
    pub repositories: Vec<String>,
    /// Run against the built-in demo connector instead of a real source.
    #[serde(default = "default_demo_mode")]
    pub demo_mode: bool,
    /// Events fabricated per poll when in demo mode.
    #[serde(default = "default_events_per_batch")]
    pub demo_events_per_batch: usize,
    #[serde(default)]
    pub score_weights: ScoreWeights,
    #[serde(default)]
    pub trend_thresholds: TrendThresholds,
    #[serde(default)]
    pub change_thresholds: ChangeThresholds,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            repositories: default_repositories(),
            demo_mode: false,
            demo_events_per_batch: DEFAULT_EVENTS_PER_BATCH,
            score_weights: ScoreWeights::default(),
            trend_thresholds: TrendThresholds::default(),
            change_thresholds: ChangeThresholds::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(PulseError::Config(
                "poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(PulseError::Config(
                "heartbeat_interval_secs must be at least 1".to_string(),
            ));
        }
        for repo in &self.repositories {
            if !repo.contains('/') {
                return Err(PulseError::Config(format!(
                    "repository '{repo}' is not in owner/name form"
                )));
            }
        }
        Ok(())
    }

    pub fn save(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .ok_or_else(|| PulseError::Config("unable to locate user config directory".to_string()))?;
    Ok(base.join("repopulse").join("config.toml"))
}

/// Load configuration from `path` (or the default location), falling back
/// to defaults when no file exists yet.
pub fn load_or_default(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let config_path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };

    let config = if config_path.exists() {
        let contents = fs::read_to_string(&config_path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        config
    } else {
        Config::default()
    };

    Ok((config, config_path))
}
