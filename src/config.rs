//! Settings read from `moneyplan.toml`, then overridden from the command line.

use crate::error::{AppError, AppResult};
use crate::operations::budget::DEFAULT_NEAR_LIMIT_PERCENT;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_CONFIG_FILE: &str = "moneyplan.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database_path: PathBuf,
    pub log_level: String,
    pub near_limit_percent: u8,
    pub currency_symbol: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("moneyplan.db"),
            log_level: "warn".to_string(),
            near_limit_percent: DEFAULT_NEAR_LIMIT_PERCENT,
            currency_symbol: "$".to_string(),
        }
    }
}

impl Config {
    pub fn from_toml(raw: &str) -> AppResult<Self> {
        let config: Config = toml::from_str(raw)?;
        config.check()?;
        Ok(config)
    }

    /// Reads `explicit` if given, otherwise the default file when it exists.
    /// Only an explicitly named file has to be present.
    pub fn load(explicit: Option<&Path>) -> AppResult<Self> {
        let (path, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        if !required && !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }
        let raw = fs::read_to_string(&path).map_err(|e| {
            AppError::validation(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&raw)
    }

    pub fn with_overrides(mut self, database_path: Option<PathBuf>, log_level: Option<String>) -> Self {
        if let Some(path) = database_path {
            self.database_path = path;
        }
        if let Some(level) = log_level {
            self.log_level = level;
        }
        self
    }

    fn check(&self) -> AppResult<()> {
        if self.near_limit_percent == 0 || self.near_limit_percent > 100 {
            return Err(AppError::validation(format!(
                "near_limit_percent must be between 1 and 100, got {}",
                self.near_limit_percent
            )));
        }
        Ok(())
    }
}
