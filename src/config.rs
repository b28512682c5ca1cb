//! Configuration Module
//!
//! Runtime settings resolved from the environment.

use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const ENV_API_URL: &str = "ATTENDANCE_API_URL";
const ENV_DATA_DIR: &str = "ATTENDANCE_DATA_DIR";
const ENV_TIMEOUT: &str = "ATTENDANCE_TIMEOUT_SECS";

/// Client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server root, without a trailing slash
    pub api_base_url: String,
    /// Private namespace for persisted credentials, logs and capture slots
    pub data_dir: PathBuf,
    pub request_timeout: Duration,
}

impl Config {
    /// Build a config from explicit values
    pub fn new(api_base_url: &str, data_dir: PathBuf) -> Result<Self, ConfigError> {
        reqwest::Url::parse(api_base_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", api_base_url, e)))?;

        Ok(Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            data_dir,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    /// Resolve the config from `ATTENDANCE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_base_url = lookup(ENV_API_URL).unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let data_dir = lookup(ENV_DATA_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        let mut config = Self::new(&api_base_url, data_dir)?;

        if let Some(raw) = lookup(ENV_TIMEOUT) {
            let secs: u64 = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidTimeout(raw.clone()))?;
            if secs == 0 {
                return Err(ConfigError::InvalidTimeout(raw));
            }
            config.request_timeout = Duration::from_secs(secs);
        }

        debug!(
            "Config resolved: api={} data_dir={:?} timeout={:?}",
            config.api_base_url, config.data_dir, config.request_timeout
        );
        Ok(config)
    }

    /// Point the config at another server
    pub fn with_api_url(self, api_base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            request_timeout: self.request_timeout,
            ..Self::new(api_base_url, self.data_dir)?
        })
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// Directory holding the per-attempt temporary photo
    pub fn capture_dir(&self) -> PathBuf {
        self.data_dir.join("capture")
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Attendance")
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid timeout (expected positive seconds): {0}")]
    InvalidTimeout(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.api_base_url, DEFAULT_API_URL);
        assert_eq!(config.request_timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert!(config.data_dir.ends_with("Attendance"));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let config = Config::from_lookup(lookup(&[
            (ENV_API_URL, "https://hr.example.com/"),
            (ENV_DATA_DIR, "/tmp/att"),
            (ENV_TIMEOUT, "5"),
        ]))
        .unwrap();
        assert_eq!(config.api_base_url, "https://hr.example.com");
        assert_eq!(config.capture_dir(), PathBuf::from("/tmp/att/capture"));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn api_url_override_keeps_other_settings() {
        let config = Config::from_lookup(lookup(&[(ENV_TIMEOUT, "7")]))
            .unwrap()
            .with_api_url("http://10.0.2.2:8000/")
            .unwrap();
        assert_eq!(config.api_base_url, "http://10.0.2.2:8000");
        assert_eq!(config.request_timeout, Duration::from_secs(7));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            Config::from_lookup(lookup(&[(ENV_API_URL, "not a url")])),
            Err(ConfigError::InvalidUrl(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[(ENV_TIMEOUT, "0")])),
            Err(ConfigError::InvalidTimeout(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[(ENV_TIMEOUT, "soon")])),
            Err(ConfigError::InvalidTimeout(_))
        ));
    }
}
