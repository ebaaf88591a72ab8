//! Environment-driven configuration.
//!
//! Every field maps to an upper-case environment variable of the same name
//! (`REQUEST_TIMEOUT`, `PAGE_CAP`, ...). A `.env` file is honored.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::Context;
use figment::Figment;
use figment::providers::Env;
use fundu::DurationParser;
use serde::{Deserialize, Deserializer};

use crate::crawler::CrawlSettings;
use crate::crawler::codes::{DEFAULT_MAX_DEPTH, DEFAULT_MIN_DEPTH, DEPTH_LIMIT};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Required unless running against the in-memory store.
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_buscacursos_url")]
    pub buscacursos_url: String,
    #[serde(default = "default_catalogo_url")]
    pub catalogo_url: String,
    /// Per-request timeout for both sites, e.g. `30s` or `2m`. A bare number is seconds.
    #[serde(
        default = "default_request_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub request_timeout: Duration,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: NonZeroU32,
    #[serde(default = "default_page_cap")]
    pub page_cap: usize,
    #[serde(default = "default_min_code_depth")]
    pub min_code_depth: usize,
    #[serde(default = "default_max_code_depth")]
    pub max_code_depth: usize,
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_buscacursos_url() -> String {
    "https://buscacursos.uc.cl/".to_owned()
}

fn default_catalogo_url() -> String {
    "https://catalogo.uc.cl/index.php".to_owned()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_requests_per_second() -> NonZeroU32 {
    NonZeroU32::MIN.saturating_add(1)
}

fn default_page_cap() -> usize {
    crate::crawler::DEFAULT_PAGE_CAP
}

fn default_min_code_depth() -> usize {
    DEFAULT_MIN_DEPTH
}

fn default_max_code_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

/// Parse a human duration such as `30s`, `1500ms` or `2m`.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let parsed = DurationParser::with_all_time_units()
        .parse(text.trim())
        .map_err(|e| format!("invalid duration '{text}': {e}"))?;
    Duration::try_from(parsed).map_err(|e| format!("invalid duration '{text}': {e}"))
}

impl Config {
    /// Load from the process environment.
    pub fn load() -> anyhow::Result<Self> {
        Self::from_figment(Figment::new().merge(Env::raw()))
    }

    pub fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let config: Self = figment.extract().context("Failed to load config")?;
        if config.page_cap == 0 {
            anyhow::bail!("PAGE_CAP must be at least 1");
        }
        if config.min_code_depth == 0 {
            anyhow::bail!("MIN_CODE_DEPTH must be at least 1");
        }
        if config.max_code_depth > DEPTH_LIMIT {
            anyhow::bail!(
                "MAX_CODE_DEPTH ({}) exceeds the supported {DEPTH_LIMIT}",
                config.max_code_depth
            );
        }
        if config.max_code_depth < config.min_code_depth {
            anyhow::bail!(
                "MAX_CODE_DEPTH ({}) is smaller than MIN_CODE_DEPTH ({})",
                config.max_code_depth,
                config.min_code_depth
            );
        }
        Ok(config)
    }

    pub fn crawl_settings(&self) -> CrawlSettings {
        CrawlSettings {
            page_cap: self.page_cap,
            min_depth: self.min_code_depth,
            max_depth: self.max_code_depth,
        }
    }
}
