use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::RecorderError;

/// Configuration for the recorder.
///
/// Every field has a default, so a partial JSON document is valid input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfiguration {
    /// Human-readable name of the aggregate device.
    pub aggregate_name: String,

    /// Well-known unique identifier of the aggregate device. At most one
    /// aggregate with this uid is kept alive by the recorder.
    pub aggregate_uid: String,

    /// Upper bound on the wait after aggregate creation (default: 1000 ms).
    pub settling_delay_ms: u64,

    /// Poll interval for the OS readiness query while settling (default: 50 ms).
    pub readiness_poll_interval_ms: u64,

    /// Requested frames per tapped buffer (default: 4096).
    pub tap_buffer_frames: u32,

    /// Make the aggregate the system default input and output (default: true).
    pub route_as_system_default: bool,

    /// Hide the aggregate from other processes (default: false).
    pub private_aggregate: bool,
}

impl RecorderConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.aggregate_name.trim().is_empty() {
            return Err("aggregate name must not be empty".into());
        }
        if self.aggregate_uid.trim().is_empty() {
            return Err("aggregate uid must not be empty".into());
        }
        if self.readiness_poll_interval_ms == 0 {
            return Err("readiness poll interval must be positive".into());
        }
        if self.readiness_poll_interval_ms > self.settling_delay_ms {
            return Err(format!(
                "readiness poll interval ({} ms) exceeds settling delay ({} ms)",
                self.readiness_poll_interval_ms, self.settling_delay_ms
            ));
        }
        if self.tap_buffer_frames == 0 {
            return Err("tap buffer size must be positive".into());
        }
        Ok(())
    }

    pub fn settling_delay(&self) -> Duration {
        Duration::from_millis(self.settling_delay_ms)
    }

    pub fn readiness_poll_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_interval_ms)
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self, RecorderError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| RecorderError::Configuration(format!("failed to parse configuration: {}", e)))?;
        config.validate().map_err(RecorderError::Configuration)?;
        Ok(config)
    }

    /// Read a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self, RecorderError> {
        let json = fs::read_to_string(path)
            .map_err(|e| RecorderError::Configuration(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }
}

impl Default for RecorderConfiguration {
    fn default() -> Self {
        Self {
            aggregate_name: "MultiRecorder Input".into(),
            aggregate_uid: "RecorderAggregate".into(),
            settling_delay_ms: 1000,
            readiness_poll_interval_ms: 50,
            tap_buffer_frames: 4096,
            route_as_system_default: true,
            private_aggregate: false,
        }
    }
}
