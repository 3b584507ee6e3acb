//! Configuration for the conditioner engine
//!
//! Every field has a default, so a partial JSON document (or `{}`) is a valid
//! configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::types::{
    NetworkCondition, NetworkMetrics, DEFAULT_FRAMERATE, MAX_BITRATE, MAX_FRAMERATE, MIN_BITRATE,
    MIN_FRAMERATE,
};

/// Exclusive upper bounds for one condition tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierBound {
    /// Packet loss fraction must be strictly below this
    pub max_loss: f64,
    /// RTT in milliseconds must be strictly below this
    pub max_rtt_ms: f64,
}

impl TierBound {
    pub const fn new(max_loss: f64, max_rtt_ms: f64) -> Self {
        Self {
            max_loss,
            max_rtt_ms,
        }
    }

    /// Both loss and RTT fall inside this tier. A value at the bound belongs to
    /// the worse tier.
    pub fn admits(&self, metrics: &NetworkMetrics) -> bool {
        metrics.packet_loss < self.max_loss && metrics.rtt_ms < self.max_rtt_ms
    }
}

/// Loss/RTT bounds used to classify a sample into a [`NetworkCondition`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConditionThresholds {
    pub excellent: TierBound,
    pub good: TierBound,
    pub fair: TierBound,
    /// Anything outside this bound is Critical
    pub poor: TierBound,
}

impl ConditionThresholds {
    pub fn classify(&self, metrics: &NetworkMetrics) -> NetworkCondition {
        if self.excellent.admits(metrics) {
            NetworkCondition::Excellent
        } else if self.good.admits(metrics) {
            NetworkCondition::Good
        } else if self.fair.admits(metrics) {
            NetworkCondition::Fair
        } else if self.poor.admits(metrics) {
            NetworkCondition::Poor
        } else {
            NetworkCondition::Critical
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let tiers = [self.excellent, self.good, self.fair, self.poor];
        for pair in tiers.windows(2) {
            if pair[0].max_loss > pair[1].max_loss || pair[0].max_rtt_ms > pair[1].max_rtt_ms {
                return Err(ConfigError::Invalid(
                    "condition thresholds must widen from excellent to poor".to_string(),
                ));
            }
        }
        if tiers.iter().any(|t| t.max_loss <= 0.0 || t.max_rtt_ms <= 0.0) {
            return Err(ConfigError::Invalid(
                "condition thresholds must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ConditionThresholds {
    fn default() -> Self {
        Self {
            excellent: TierBound::new(0.05, 50.0),
            good: TierBound::new(0.10, 100.0),
            fair: TierBound::new(0.20, 200.0),
            poor: TierBound::new(0.40, 500.0),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionerConfig {
    /// Lowest bitrate in bps (default: 128 Kbps)
    #[serde(default = "default_min_bitrate")]
    pub min_bitrate: u32,

    /// Highest bitrate in bps (default: 8 Mbps)
    #[serde(default = "default_max_bitrate")]
    pub max_bitrate: u32,

    #[serde(default = "default_min_frame_rate")]
    pub min_frame_rate: u32,

    #[serde(default = "default_max_frame_rate")]
    pub max_frame_rate: u32,

    /// Frame rate a session starts with (default: 30)
    #[serde(default = "default_frame_rate")]
    pub default_frame_rate: u32,

    /// Period of the monitoring task (default: 2000)
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_ms: u64,

    /// Minimum gap between two autonomous adjustments (default: 5000)
    #[serde(default = "default_adjustment_cooldown")]
    pub adjustment_cooldown_ms: u64,

    /// Shared classification thresholds; strategies may use their own
    #[serde(default)]
    pub thresholds: ConditionThresholds,
}

fn default_min_bitrate() -> u32 {
    MIN_BITRATE
}

fn default_max_bitrate() -> u32 {
    MAX_BITRATE
}

fn default_min_frame_rate() -> u32 {
    MIN_FRAMERATE
}

fn default_max_frame_rate() -> u32 {
    MAX_FRAMERATE
}

fn default_frame_rate() -> u32 {
    DEFAULT_FRAMERATE
}

fn default_monitor_interval() -> u64 {
    2000
}

fn default_adjustment_cooldown() -> u64 {
    5000
}

impl Default for ConditionerConfig {
    fn default() -> Self {
        Self {
            min_bitrate: default_min_bitrate(),
            max_bitrate: default_max_bitrate(),
            min_frame_rate: default_min_frame_rate(),
            max_frame_rate: default_max_frame_rate(),
            default_frame_rate: default_frame_rate(),
            monitor_interval_ms: default_monitor_interval(),
            adjustment_cooldown_ms: default_adjustment_cooldown(),
            thresholds: ConditionThresholds::default(),
        }
    }
}

impl ConditionerConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_bitrate == 0 || self.min_bitrate > self.max_bitrate {
            return Err(ConfigError::Invalid(format!(
                "bitrate bounds {}..={} are invalid",
                self.min_bitrate, self.max_bitrate
            )));
        }
        if self.min_frame_rate == 0 || self.min_frame_rate > self.max_frame_rate {
            return Err(ConfigError::Invalid(format!(
                "frame rate bounds {}..={} are invalid",
                self.min_frame_rate, self.max_frame_rate
            )));
        }
        if !(self.min_frame_rate..=self.max_frame_rate).contains(&self.default_frame_rate) {
            return Err(ConfigError::Invalid(format!(
                "default frame rate {} is outside {}..={}",
                self.default_frame_rate, self.min_frame_rate, self.max_frame_rate
            )));
        }
        if self.monitor_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "monitor interval must be non-zero".to_string(),
            ));
        }
        self.thresholds.validate()
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    pub fn adjustment_cooldown(&self) -> Duration {
        Duration::from_millis(self.adjustment_cooldown_ms)
    }

    /// Clamp a bitrate into the configured bounds. Never panics, even on an
    /// unvalidated config.
    pub fn clamp_bitrate(&self, bitrate: u32) -> u32 {
        bitrate.max(self.min_bitrate).min(self.max_bitrate)
    }

    pub fn clamp_frame_rate(&self, frame_rate: u32) -> u32 {
        frame_rate.max(self.min_frame_rate).min(self.max_frame_rate)
    }
}
