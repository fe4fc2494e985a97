//! Startup configuration.
//!
//! Resolved once in `main` from CLI flags, the process environment and an
//! optional `.env` file, then passed down explicitly. Nothing below `main`
//! reads environment variables.

use std::path::PathBuf;

use crate::error::{AdvisorError, AdvisorResult};

pub const API_KEY_VAR: &str = "GROQ_API_KEY";
pub const DATA_PATH_VAR: &str = "HEALTH_DATA_PATH";
pub const CACHE_PATH_VAR: &str = "HEALTH_CACHE_PATH";
pub const MODEL_VAR: &str = "HEALTH_MODEL";
pub const API_BASE_VAR: &str = "HEALTH_API_BASE";

pub const DEFAULT_DATA_PATH: &str = "data/patients.csv";
pub const DEFAULT_MODEL: &str = "llama3-8b-8192";
pub const DEFAULT_API_BASE: &str = "https://api.groq.com/openai/v1";

#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        CompletionConfig {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

impl CompletionConfig {
    pub fn require_api_key(&self) -> AdvisorResult<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AdvisorError::Config(format!("{API_KEY_VAR} is not set")))
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_path: PathBuf,
    pub cache_path: Option<PathBuf>,
    pub completion: CompletionConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            cache_path: None,
            completion: CompletionConfig::default(),
        }
    }
}

impl AppConfig {
    /// Build from a variable lookup; `lookup` is the process environment in
    /// `main` and a map in tests.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AppConfig::default();
        AppConfig {
            data_path: lookup(DATA_PATH_VAR)
                .map(PathBuf::from)
                .unwrap_or(defaults.data_path),
            cache_path: lookup(CACHE_PATH_VAR).map(PathBuf::from),
            completion: CompletionConfig {
                api_base: lookup(API_BASE_VAR).unwrap_or(defaults.completion.api_base),
                api_key: lookup(API_KEY_VAR),
                model: lookup(MODEL_VAR).unwrap_or(defaults.completion.model),
            },
        }
    }

    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            log::debug!("loaded environment from {:?}", path);
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = AppConfig::from_lookup(|_| None);
        assert_eq!(config.data_path, PathBuf::from(DEFAULT_DATA_PATH));
        assert_eq!(config.completion.model, DEFAULT_MODEL);
        assert_eq!(config.completion.api_base, DEFAULT_API_BASE);
        assert!(config.cache_path.is_none());
        assert!(config.completion.require_api_key().is_err());
    }

    #[test]
    fn reads_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (DATA_PATH_VAR, "/srv/patients.parquet"),
            (CACHE_PATH_VAR, "/tmp/cache.parquet"),
            (MODEL_VAR, "llama3-70b-8192"),
            (API_KEY_VAR, "secret"),
        ]);
        let config = AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.data_path, PathBuf::from("/srv/patients.parquet"));
        assert_eq!(config.cache_path, Some(PathBuf::from("/tmp/cache.parquet")));
        assert_eq!(config.completion.model, "llama3-70b-8192");
        assert_eq!(config.completion.require_api_key().unwrap(), "secret");
    }

    #[test]
    fn blank_api_key_is_rejected() {
        let config = AppConfig::from_lookup(|k| (k == API_KEY_VAR).then(|| "  ".to_string()));
        assert!(matches!(
            config.completion.require_api_key(),
            Err(AdvisorError::Config(_))
        ));
    }
}
