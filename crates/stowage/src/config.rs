use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stowage_fetch::{RetryPolicy, WorkerOptions};

use crate::{Lane, ProviderError, Result};

/// Provider settings, usually loaded from TOML.
///
/// ```
/// let config = stowage::ProviderConfig::from_toml_str(
///     r#"
///     base_url = "https://cdn.example.com/game/1.4"
///     local_root = "cache/bundles"
///     retry_limit = 5
///     idle_bytes_per_second = 262144
///     "#,
/// )
/// .unwrap();
/// assert_eq!(config.retry_limit, 5);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url:                String,
    pub local_root:              PathBuf,
    /// Read-only location of pre-shipped bundles and `embedded.json`.
    pub streaming_root:          Option<PathBuf>,
    /// Attempts per download; `0` retries forever.
    pub retry_limit:             u32,
    pub retry_backoff_ms:        u64,
    pub request_timeout_secs:    u64,
    /// `0` is unlimited.
    pub active_bytes_per_second: u64,
    pub idle_bytes_per_second:   u64,
    /// Attempts when fetching `checksum.txt`.
    pub validate_retry:          u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url:                String::new(),
            local_root:              PathBuf::from("bundles"),
            streaming_root:          None,
            retry_limit:             3,
            retry_backoff_ms:        1000,
            request_timeout_secs:    30,
            active_bytes_per_second: 0,
            idle_bytes_per_second:   0,
            validate_retry:          3,
        }
    }
}

impl ProviderConfig {
    pub fn new(base_url: impl Into<String>, local_root: impl Into<PathBuf>) -> Self {
        Self {
            base_url: base_url.into(),
            local_root: local_root.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> { Ok(toml::from_str(s)?) }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(ProviderError::io(path))?;
        Self::from_toml_str(&text)
    }

    #[must_use]
    pub fn streaming_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.streaming_root = Some(root.into());
        self
    }

    #[must_use]
    pub fn retry(mut self, limit: u32, backoff: Duration) -> Self {
        self.retry_limit = limit;
        self.retry_backoff_ms = backoff.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs().max(1);
        self
    }

    #[must_use]
    pub fn bytes_per_second(mut self, active: u64, idle: u64) -> Self {
        self.active_bytes_per_second = active;
        self.idle_bytes_per_second = idle;
        self
    }

    #[must_use]
    pub fn validate_retry(mut self, attempts: u32) -> Self {
        self.validate_retry = attempts;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_limit, Duration::from_millis(self.retry_backoff_ms))
    }

    pub fn request_timeout_duration(&self) -> Duration { Duration::from_secs(self.request_timeout_secs) }

    pub fn worker_options(&self, lane: Lane) -> WorkerOptions {
        let (name, bps) = match lane {
            Lane::Active => ("active", self.active_bytes_per_second),
            Lane::Idle => ("idle", self.idle_bytes_per_second),
        };
        WorkerOptions::new(name)
            .bytes_per_second(bps)
            .retry(self.retry_policy())
            .request_timeout(self.request_timeout_duration())
    }

    /// `{base_url}/{name}` without doubling the slash.
    pub fn url_for(&self, name: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_keys() {
        let config = ProviderConfig::from_toml_str(r#"base_url = "http://cdn""#).unwrap();
        assert_eq!(config.retry_limit, 3);
        assert_eq!(config.local_root, PathBuf::from("bundles"));
        assert_eq!(config.streaming_root, None);
    }

    #[test]
    fn test_rejects_bad_types() {
        assert!(matches!(
            ProviderConfig::from_toml_str("retry_limit = \"many\""),
            Err(ProviderError::Config(_))
        ));
    }

    #[test]
    fn test_worker_options_per_lane() {
        let config = ProviderConfig::new("http://cdn", "/tmp/x")
            .bytes_per_second(1000, 200)
            .retry(0, Duration::from_millis(5));

        let active = config.worker_options(Lane::Active);
        let idle = config.worker_options(Lane::Idle);
        assert_eq!(active.bytes_per_second, 1000);
        assert_eq!(idle.bytes_per_second, 200);
        assert!(idle.retry.should_retry(1_000));
    }

    #[test]
    fn test_url_for() {
        let config = ProviderConfig::new("http://cdn/game/", "/tmp");
        assert_eq!(config.url_for("b1.pkg"), "http://cdn/game/b1.pkg");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stowage.toml");
        std::fs::write(&path, "base_url = \"http://cdn\"\nvalidate_retry = 1\n").unwrap();
        assert_eq!(ProviderConfig::load(&path).unwrap().validate_retry, 1);
    }
}
