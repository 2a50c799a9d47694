use crate::app::lookup::RetryPolicy;
use crate::common::constants::*;
use crate::common::error::{Result, ScraperError};
use chrono_tz::Tz;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scrape: ScrapeConfig,
    pub lookup: LookupConfig,
    pub llm: LlmConfig,
    pub tmdb: TmdbConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub calendar_url: String,
    /// IANA zone the theater lists showtimes in
    pub timezone: String,
    pub detail_jitter_ms: (u64, u64),
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            calendar_url: CALENDAR_URL.to_string(),
            timezone: THEATER_TIMEZONE.to_string(),
            detail_jitter_ms: DETAIL_JITTER_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    pub max_attempts: u32,
    pub backoff_secs: u64,
    pub timeout_secs: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_secs: DEFAULT_BACKOFF_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub jitter_ms: (u64, u64),
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: OPENAI_BASE_URL.to_string(),
            model: OPENAI_MODEL.to_string(),
            jitter_ms: LLM_JITTER_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TmdbConfig {
    pub base_url: String,
    pub jitter_ms: (u64, u64),
}

impl Default for TmdbConfig {
    fn default() -> Self {
        Self {
            base_url: TMDB_BASE_URL.to_string(),
            jitter_ms: TMDB_JITTER_MS,
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from `config.toml` when no path is
    /// given. A missing default file yields the built-in defaults; a missing
    /// explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (config_path, required) = match path {
            Some(p) => (p, true),
            None => (Path::new(DEFAULT_CONFIG_PATH), false),
        };

        if !required && !config_path.exists() {
            return Ok(Config::default());
        }

        let config_content = fs::read_to_string(config_path).map_err(|e| {
            ScraperError::Config(format!("Failed to read config file '{}': {}", config_path.display(), e))
        })?;
        Self::from_toml(&config_content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.scrape
            .timezone
            .parse::<Tz>()
            .map_err(|e| ScraperError::Config(format!("Unknown timezone '{}': {}", self.scrape.timezone, e)))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.lookup.max_attempts,
            backoff: Duration::from_secs(self.lookup.backoff_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup.timeout_secs)
    }

    pub fn chat_completions_url(&self) -> String {
        join_url(&self.llm.base_url, OPENAI_CHAT_ENDPOINT)
    }

    pub fn tmdb_search_url(&self) -> String {
        join_url(&self.tmdb.base_url, TMDB_SEARCH_ENDPOINT)
    }
}

/// Read a required credential from the environment
pub fn require_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ScraperError::Config(format!("{} env var required", name))),
    }
}

fn join_url(base: &str, endpoint: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), endpoint.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.scrape.calendar_url, "https://roxie.com/calendar/");
        assert_eq!(config.timezone().unwrap(), chrono_tz::America::Los_Angeles);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.tmdb_search_url(), "https://api.themoviedb.org/3/search/movie");
        assert_eq!(config.chat_completions_url(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = Config::from_toml(
            r#"
            [scrape]
            timezone = "America/New_York"
            detail_jitter_ms = [0, 0]

            [lookup]
            max_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.timezone().unwrap(), chrono_tz::America::New_York);
        assert_eq!(config.scrape.detail_jitter_ms, (0, 0));
        assert_eq!(config.scrape.calendar_url, CALENDAR_URL);
        assert_eq!(config.lookup.max_attempts, 5);
        assert_eq!(config.lookup.backoff_secs, DEFAULT_BACKOFF_SECS);
        assert_eq!(config.llm.model, OPENAI_MODEL);
    }

    #[test]
    fn test_unknown_timezone() {
        let config = Config::from_toml("[scrape]\ntimezone = \"Mars/Olympus\"\n").unwrap();
        assert!(matches!(config.timezone(), Err(ScraperError::Config(_))));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = Config::load(Some(Path::new("/definitely/not/here.toml")));
        assert!(matches!(result, Err(ScraperError::Config(_))));
    }

    #[test]
    fn test_require_env_missing() {
        let result = require_env("ROXIE_SCRAPER_TEST_UNSET_VARIABLE");
        assert!(matches!(result, Err(ScraperError::Config(_))));
    }
}
