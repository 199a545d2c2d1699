//! Display runtime configuration.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use convoy_nav_engine::{AvoidanceFlags, GuidanceConfig, OsrmRouteProvider, SimulationConfig};
use convoy_replication::ReplicationConfig;
use convoy_schemas::{LatLng, Place};
use convoy_sync_client::SyncClientConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Settings for one display, loaded from JSON and overridden by CLI flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Relay connection, including the role to ask for.
    pub sync: SyncClientConfig,
    /// OSRM base URL used for routing.
    pub osrm_url: String,
    /// Timeout for one route request, in milliseconds.
    pub route_timeout_ms: u64,
    /// Road classes every route request avoids.
    pub avoid: AvoidanceFlags,
    /// Where the simulated vehicle starts.
    pub start: LatLng,
    /// Destination previewed on startup.
    pub destination: Option<Place>,
    /// Start navigating to `destination` without waiting for a command.
    pub auto_start: bool,
    /// Simulation ticks per second.
    pub tick_rate_hz: u32,
    /// Remaining range on startup, kilometers.
    pub initial_range_km: f64,
    /// Minimum gap between `location` broadcasts, in milliseconds.
    pub location_period_ms: u64,
    /// Gap between `navigation_info` broadcasts, in milliseconds.
    pub navigation_info_period_ms: u64,
    /// Motion simulation tunables.
    pub simulation: SimulationConfig,
    /// Voice guidance tunables.
    pub guidance: GuidanceConfig,
    /// Replication tunables.
    pub replication: ReplicationConfig,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            sync: SyncClientConfig::default(),
            osrm_url: OsrmRouteProvider::PUBLIC_BASE_URL.to_string(),
            route_timeout_ms: 10_000,
            avoid: AvoidanceFlags::default(),
            start: LatLng::new(37.7749, -122.4194),
            destination: None,
            auto_start: false,
            tick_rate_hz: 60,
            initial_range_km: 478.0,
            location_period_ms: 1_000,
            navigation_info_period_ms: 60_000,
            simulation: SimulationConfig::default(),
            guidance: GuidanceConfig::default(),
            replication: ReplicationConfig::default(),
        }
    }
}

impl DashboardConfig {
    /// Interval between simulation ticks.
    pub fn tick_period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.tick_rate_hz.max(1)))
    }

    /// Timeout for one route request.
    pub fn route_timeout(&self) -> Duration {
        Duration::from_millis(self.route_timeout_ms)
    }

    /// Minimum interval between `location` broadcasts.
    pub fn location_period(&self) -> Duration {
        Duration::from_millis(self.location_period_ms)
    }

    /// Interval between `navigation_info` broadcasts while navigating.
    pub fn navigation_info_period(&self) -> Duration {
        Duration::from_millis(self.navigation_info_period_ms)
    }

    /// Load from a JSON file. A missing file yields the defaults.
    pub async fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(?path, "Dashboard config not found, using defaults");
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read dashboard config: {path:?}"))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse dashboard config: {path:?}"))?;
        debug!(?path, "Loaded dashboard config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[tokio::test]
    async fn test_nested_sections_fall_back_to_defaults() -> TestResult {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(
            file,
            r#"{{
                "sync": {{"server_url": "ws://relay.local:3001", "requested_role": "car2-main"}},
                "destination": {{"latitude": 37.8, "longitude": -122.4, "name": "Ferry Building"}},
                "simulation": {{"cruise_speed_kmh": 60.0}}
            }}"#
        )?;

        let config = DashboardConfig::load_from_path(file.path()).await?;
        assert_eq!(config.sync.server_url, "ws://relay.local:3001");
        assert_eq!(config.sync.reconnect_cap_ms, 30_000);
        assert_eq!(config.destination.clone().map(|p| p.name), Some("Ferry Building".to_string()));
        assert!((config.simulation.corner_speed_kmh - 20.0).abs() < f64::EPSILON);
        assert_eq!(config.tick_rate_hz, 60);
        assert_eq!(config.tick_period(), Duration::from_nanos(16_666_666));
        Ok(())
    }
}
