//! Value types shared by the engine and every strategy

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Lowest bitrate any adjustment may apply (128 Kbps)
pub const MIN_BITRATE: u32 = 128_000;
/// Highest bitrate any adjustment may apply (8 Mbps)
pub const MAX_BITRATE: u32 = 8_000_000;
/// Lowest frame rate any adjustment may apply
pub const MIN_FRAMERATE: u32 = 10;
/// Highest frame rate any adjustment may apply
pub const MAX_FRAMERATE: u32 = 60;
/// Frame rate used when a session starts
pub const DEFAULT_FRAMERATE: u32 = 30;

/// Five-tier classification of the latest telemetry sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkCondition {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl NetworkCondition {
    pub const ALL: [NetworkCondition; 5] = [
        NetworkCondition::Excellent,
        NetworkCondition::Good,
        NetworkCondition::Fair,
        NetworkCondition::Poor,
        NetworkCondition::Critical,
    ];

    /// Severity score, 0 (Excellent) to 4 (Critical)
    pub fn score(self) -> u8 {
        self as u8
    }

    /// Inverse of [`score`](Self::score); fractional scores round to the nearest tier
    pub fn from_score(score: f64) -> Self {
        let idx = score.round().clamp(0.0, 4.0) as usize;
        Self::ALL[idx]
    }

    /// Excellent or Good
    pub fn is_good(self) -> bool {
        matches!(self, NetworkCondition::Excellent | NetworkCondition::Good)
    }

    /// Poor or Critical
    pub fn is_degraded(self) -> bool {
        matches!(self, NetworkCondition::Poor | NetworkCondition::Critical)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NetworkCondition::Excellent => "excellent",
            NetworkCondition::Good => "good",
            NetworkCondition::Fair => "fair",
            NetworkCondition::Poor => "poor",
            NetworkCondition::Critical => "critical",
        }
    }
}

impl fmt::Display for NetworkCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Adaptation strategy selector
///
/// The integer codes are stable and used by external selection surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConditionerMode {
    LogarithmicDescend = 0,
    LadderAscend = 1,
    Hybrid = 2,
    Constant = 3,
}

impl ConditionerMode {
    pub const ALL: [ConditionerMode; 4] = [
        ConditionerMode::LogarithmicDescend,
        ConditionerMode::LadderAscend,
        ConditionerMode::Hybrid,
        ConditionerMode::Constant,
    ];

    /// Stable integer code (0-3)
    pub fn value(self) -> i32 {
        self as i32
    }

    /// Resolve an integer code; anything outside 0-3 resolves to `Constant`
    pub fn from_value(value: i32) -> Self {
        Self::try_from_value(value).unwrap_or(ConditionerMode::Constant)
    }

    /// Strict lookup, `None` for unknown codes
    pub fn try_from_value(value: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.value() == value)
    }

    pub fn name(self) -> &'static str {
        match self {
            ConditionerMode::LogarithmicDescend => "logarithmic-descend",
            ConditionerMode::LadderAscend => "ladder-ascend",
            ConditionerMode::Hybrid => "hybrid",
            ConditionerMode::Constant => "constant",
        }
    }
}

impl fmt::Display for ConditionerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConditionerMode {
    type Err = ConfigError;

    /// Accepts a mode name or an integer code. Integer codes follow
    /// [`from_value`](Self::from_value), so unknown numbers become `Constant`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(code) = s.parse::<i32>() {
            return Ok(Self::from_value(code));
        }
        let lowered = s.to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|m| m.name() == lowered)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown conditioner mode '{}'", s)))
    }
}

/// One telemetry sample after range clamping
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkMetrics {
    /// Fraction of packets lost, 0.0-1.0
    pub packet_loss: f64,
    /// Round-trip time in milliseconds
    pub rtt_ms: f64,
    /// Estimated available bandwidth in bits per second
    pub bandwidth_bps: f64,
}

impl NetworkMetrics {
    /// Build a sample, clamping out-of-range input. NaN is treated as zero.
    pub fn clamped(packet_loss: f64, rtt_ms: f64, bandwidth_bps: f64) -> Self {
        fn finite_or_zero(v: f64) -> f64 {
            if v.is_nan() {
                0.0
            } else {
                v
            }
        }
        Self {
            packet_loss: finite_or_zero(packet_loss).clamp(0.0, 1.0),
            rtt_ms: finite_or_zero(rtt_ms).max(0.0),
            bandwidth_bps: finite_or_zero(bandwidth_bps).max(0.0),
        }
    }

    pub fn loss_percent(&self) -> f64 {
        self.packet_loss * 100.0
    }
}

/// An applied change of encoder quality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAdjustment {
    pub new_bitrate: u32,
    pub new_frame_rate: u32,
    pub previous_bitrate: u32,
    pub previous_frame_rate: u32,
    pub reason: String,
    pub condition: NetworkCondition,
    /// Set for adjustments made through `force_quality_adjustment`
    pub forced: bool,
    pub timestamp: DateTime<Utc>,
}

impl QualityAdjustment {
    pub fn is_increase(&self) -> bool {
        self.new_bitrate > self.previous_bitrate
    }

    pub fn is_decrease(&self) -> bool {
        self.new_bitrate < self.previous_bitrate
    }

    pub fn frame_rate_changed(&self) -> bool {
        self.new_frame_rate != self.previous_frame_rate
    }
}

/// Read-only statistics snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionerStats {
    pub total_adjustments: u64,
    pub increase_adjustments: u64,
    pub decrease_adjustments: u64,
    pub frame_rate_changes: u64,
    /// Autonomous adjustments dropped by the global cooldown
    pub rejected_adjustments: u64,
    /// Adjustments whose push to the streamer failed
    pub streamer_failures: u64,
    pub metric_samples: u64,
    pub uptime_ms: u64,
    pub average_condition: NetworkCondition,
}

impl ConditionerStats {
    pub fn uptime(&self) -> Duration {
        Duration::from_millis(self.uptime_ms)
    }
}

impl Default for ConditionerStats {
    fn default() -> Self {
        Self {
            total_adjustments: 0,
            increase_adjustments: 0,
            decrease_adjustments: 0,
            frame_rate_changes: 0,
            rejected_adjustments: 0,
            streamer_failures: 0,
            metric_samples: 0,
            uptime_ms: 0,
            average_condition: NetworkCondition::Good,
        }
    }
}

/// Lifecycle of a conditioner instance. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionerState {
    Idle,
    Active,
    Stopped,
}

/// Scale an integer quantity by a factor, rounding to the nearest unit
pub(crate) fn scale(value: u32, factor: f64) -> u32 {
    (value as f64 * factor).round().clamp(0.0, u32::MAX as f64) as u32
}
