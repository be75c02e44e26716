//! Provider configuration.
//!
//! Read from an optional TOML file; command-line flags override individual values.

use hyperv_mgmt::{FreshSessions, JobTracker, ManagementTransport, PooledSessions, SessionProvider};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_STATE_FILE: &str = "hyperv-sim.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Host to manage; empty for the local machine.
    pub host: String,
    pub poll_interval_ms: u64,
    /// Upper bound on waiting for a single job. Unbounded when unset.
    pub job_timeout_secs: Option<u64>,
    pub pool_sessions: bool,
    pub max_idle_sessions: usize,
    pub state_file: PathBuf,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            poll_interval_ms: 500,
            job_timeout_secs: None,
            pool_sessions: false,
            max_idle_sessions: 4,
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
        }
    }
}

impl ProviderConfig {
    pub fn from_toml_str(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents, path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be greater than 0".into()));
        }
        if self.job_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid("job_timeout_secs must be greater than 0".into()));
        }
        if self.pool_sessions && self.max_idle_sessions == 0 {
            return Err(ConfigError::Invalid(
                "max_idle_sessions must be greater than 0 when pooling".into(),
            ));
        }
        Ok(())
    }

    pub fn job_tracker(&self) -> JobTracker {
        JobTracker::new(
            Duration::from_millis(self.poll_interval_ms),
            self.job_timeout_secs.map(Duration::from_secs),
        )
    }

    pub fn session_provider(&self, transport: Arc<dyn ManagementTransport>) -> Arc<dyn SessionProvider> {
        if self.pool_sessions {
            Arc::new(PooledSessions::new(transport, self.max_idle_sessions))
        } else {
            Arc::new(FreshSessions::new(transport))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProviderConfig::default();
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.job_timeout_secs, None);
        assert!(!config.pool_sessions);

        let tracker = config.job_tracker();
        assert_eq!(tracker.poll_interval(), Duration::from_millis(500));
        assert_eq!(tracker.max_wait(), None);
    }

    #[test]
    fn test_partial_toml() {
        let config = ProviderConfig::from_toml_str(
            "host = \"hv-01\"\njob_timeout_secs = 600\npool_sessions = true\n",
            Path::new("provider.toml"),
        )
        .unwrap();
        assert_eq!(config.host, "hv-01");
        assert_eq!(config.job_timeout_secs, Some(600));
        assert!(config.pool_sessions);
        assert_eq!(config.poll_interval_ms, 500);
    }

    #[test]
    fn test_rejects_zero_interval() {
        let err = ProviderConfig::from_toml_str("poll_interval_ms = 0", Path::new("provider.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_bad_toml() {
        let err = ProviderConfig::from_toml_str("host = ", Path::new("provider.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("provider.toml");
        tokio::fs::write(&path, "poll_interval_ms = 50\n").await.unwrap();

        let config = ProviderConfig::load(&path).await.unwrap();
        assert_eq!(config.poll_interval_ms, 50);

        let err = ProviderConfig::load(&dir.path().join("missing.toml")).await.unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
