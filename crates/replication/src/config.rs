//! Replication tunables.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Replication tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Unanswered prompts are accepted after this long.
    pub prompt_timeout_ms: u64,
    /// Mirrored jumps longer than this snap the camera instead of animating.
    pub camera_snap_distance_m: f64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            prompt_timeout_ms: 8_000,
            camera_snap_distance_m: 500.0,
        }
    }
}

impl ReplicationConfig {
    /// Time before an unanswered prompt is accepted.
    pub fn prompt_timeout(&self) -> Duration {
        Duration::from_millis(self.prompt_timeout_ms)
    }
}
