//! Relay configuration.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Relay settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address the relay listens on.
    pub bind: SocketAddr,
    /// Messages kept for a polling device before the oldest are dropped.
    pub poll_queue_capacity: usize,
    /// A polling device that has not polled for this long stops receiving queued messages.
    pub poll_idle_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 3001)),
            poll_queue_capacity: 256,
            poll_idle_timeout_ms: 30_000,
        }
    }
}

impl RelayConfig {
    /// Idle time after which an unpolled queue is dropped.
    pub fn poll_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_idle_timeout_ms)
    }

    /// Load from a JSON file. A missing file yields the defaults.
    pub async fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(?path, "Relay config not found, using defaults");
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read relay config: {path:?}"))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse relay config: {path:?}"))?;
        debug!(?path, "Loaded relay config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[tokio::test]
    async fn test_partial_file_keeps_defaults() -> TestResult {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, r#"{{"bind": "127.0.0.1:4000"}}"#)?;

        let config = RelayConfig::load_from_path(file.path()).await?;
        assert_eq!(config.bind, SocketAddr::from(([127, 0, 0, 1], 4000)));
        assert_eq!(config.poll_queue_capacity, 256);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_file_and_bad_json() -> TestResult {
        let dir = tempfile::tempdir()?;
        let config = RelayConfig::load_from_path(dir.path().join("absent.json")).await?;
        assert_eq!(config, RelayConfig::default());

        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, "bind = 1")?;
        assert!(RelayConfig::load_from_path(file.path()).await.is_err());
        Ok(())
    }
}
