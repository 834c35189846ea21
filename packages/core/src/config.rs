//! Runtime configuration for the taxonomy service

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable selecting the libsql database file
pub const ENV_DB_PATH: &str = "TAXONOMY_DB_PATH";

/// Environment variable overriding the cache time-to-live in seconds
pub const ENV_CACHE_TTL_SECS: &str = "TAXONOMY_CACHE_TTL_SECS";

/// Titles longer than this are rejected regardless of configuration
const MAX_SUPPORTED_TITLE_LENGTH: usize = 255;

/// Configuration shared by the category service and its backends
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxonomyConfig {
    /// libsql database file; `None` keeps everything in memory
    pub database_path: Option<PathBuf>,

    /// Default time-to-live for cached views
    pub cache_ttl_secs: u64,

    /// Maximum slug length, suffix included
    pub slug_max_length: usize,

    /// Number of `-n` suffixes tried before giving up with `SlugConflict`
    pub slug_retry_budget: usize,

    /// Maximum title length in characters
    pub title_max_length: usize,

    /// SQLite busy timeout for the libsql backend
    pub busy_timeout_ms: u64,
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            cache_ttl_secs: 3600,
            slug_max_length: 100,
            slug_retry_budget: 1000,
            title_max_length: 50,
            busy_timeout_ms: 5000,
        }
    }
}

impl TaxonomyConfig {
    /// Defaults overridden by `TAXONOMY_DB_PATH` and `TAXONOMY_CACHE_TTL_SECS`
    pub fn from_env() -> Result<Self, String> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var(ENV_DB_PATH) {
            if !path.trim().is_empty() {
                config.database_path = Some(PathBuf::from(path));
            }
        }

        if let Ok(ttl) = std::env::var(ENV_CACHE_TTL_SECS) {
            config.cache_ttl_secs = ttl
                .trim()
                .parse()
                .map_err(|e| format!("{} must be a positive integer: {}", ENV_CACHE_TTL_SECS, e))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_ttl_secs == 0 {
            return Err("cache_ttl_secs must be greater than 0".to_string());
        }

        if self.slug_max_length == 0 {
            return Err("slug_max_length must be greater than 0".to_string());
        }

        if self.slug_retry_budget == 0 {
            return Err("slug_retry_budget must be greater than 0".to_string());
        }

        if self.title_max_length == 0 {
            return Err("title_max_length must be greater than 0".to_string());
        }

        if self.title_max_length > MAX_SUPPORTED_TITLE_LENGTH {
            return Err(format!(
                "title_max_length cannot exceed {}",
                MAX_SUPPORTED_TITLE_LENGTH
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TaxonomyConfig::default();
        assert!(config.database_path.is_none());
        assert_eq!(config.cache_ttl(), Duration::from_secs(3600));
        assert_eq!(config.slug_max_length, 100);
        assert_eq!(config.title_max_length, 50);
    }

    #[test]
    fn test_config_validation() {
        let mut config = TaxonomyConfig::default();
        assert!(config.validate().is_ok());

        config.cache_ttl_secs = 0;
        assert!(config.validate().is_err());

        config.cache_ttl_secs = 60;
        config.slug_retry_budget = 0;
        assert!(config.validate().is_err());

        config.slug_retry_budget = 10;
        config.title_max_length = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: TaxonomyConfig =
            serde_json::from_str(r#"{"cache_ttl_secs": 10}"#).unwrap();
        assert_eq!(config.cache_ttl_secs, 10);
        assert_eq!(config.slug_retry_budget, 1000);
    }
}
