use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};

use crate::logging::{Level, LOG_LEVEL_ENV};

pub const REST_BASE_URL_ENV: &str = "OSCAL_REST_BASE_URL";
pub const TIMEOUT_ENV: &str = "OSCAL_HTTP_TIMEOUT_MS";

const DEFAULT_REST_BASE_URL: &str = "http://localhost:8080/oscal/v1";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Runtime settings. Layering order: defaults, TOML file, environment,
/// then whatever the caller sets explicitly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub rest_base_url: String,
    pub log_level: String,
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rest_base_url: DEFAULT_REST_BASE_URL.to_string(),
            log_level: Level::Info.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            user_agent: format!("oscal-kernel-rs/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(text).map_err(|err| anyhow!("invalid configuration: {err}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, then the optional file, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Same layering as [`Config::load`] with `lookup` standing in for the
    /// process environment.
    pub fn load_with_env<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => {
                let text = fs::read_to_string(path).with_context(|| {
                    format!("unable to read configuration file {}", path.display())
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_env(lookup)?;
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(REST_BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.rest_base_url = url;
        }
        if let Some(level) = lookup(LOG_LEVEL_ENV).filter(|v| !v.trim().is_empty()) {
            self.log_level = level;
        }
        if let Some(raw) = lookup(TIMEOUT_ENV).filter(|v| !v.trim().is_empty()) {
            self.timeout_ms = raw
                .trim()
                .parse()
                .map_err(|_| anyhow!("{TIMEOUT_ENV} must be a positive integer, got {raw}"))?;
        }
        self.validate()
    }

    pub fn level(&self) -> Result<Level> {
        self.log_level.parse()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Base URL without a trailing slash.
    pub fn rest_base(&self) -> &str {
        self.rest_base_url.trim_end_matches('/')
    }

    fn validate(&self) -> Result<()> {
        self.level()?;
        if self.timeout_ms == 0 {
            return Err(anyhow!("timeout-ms must be greater than zero"));
        }
        Ok(())
    }
}
