//! Coordinator-side topology configuration

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// Configuration for the shared cluster topology
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Name of the root node
    pub root_id: String,

    /// Volumes at or above this size no longer accept writes
    pub volume_size_limit_bytes: u64,

    /// Expected interval between storage node heartbeats, in seconds
    pub pulse_seconds: u64,

    /// Number of missed pulses after which a storage node is stale
    pub fresh_pulses: u32,

    /// Data center used when a heartbeat names none
    pub default_data_center: String,

    /// Rack used when a heartbeat names none
    pub default_rack: String,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            root_id: "topo".to_string(),
            volume_size_limit_bytes: 30 * 1024 * 1024 * 1024,
            pulse_seconds: 5,
            fresh_pulses: 3,
            default_data_center: "DefaultDataCenter".to_string(),
            default_rack: "DefaultRack".to_string(),
        }
    }
}

impl TopologyConfig {
    /// Parse a YAML document; missing keys take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make every node stale or every volume full.
    pub fn validate(&self) -> Result<()> {
        if self.root_id.is_empty() {
            return Err(Error::Config("root_id must not be empty".to_string()));
        }
        if self.volume_size_limit_bytes == 0 {
            return Err(Error::Config(
                "volume_size_limit_bytes must be greater than zero".to_string(),
            ));
        }
        if self.pulse_seconds == 0 || self.fresh_pulses == 0 {
            return Err(Error::Config(
                "pulse_seconds and fresh_pulses must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// How long a storage node stays fresh after its last heartbeat.
    pub fn freshness_window(&self) -> Duration {
        Duration::from_secs(self.pulse_seconds.saturating_mul(self.fresh_pulses as u64))
    }

    /// Oldest `last_seen` still considered fresh at `now`.
    pub fn freshness_threshold(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        ChronoDuration::from_std(self.freshness_window())
            .ok()
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}
