//! Adaptation strategies
//!
//! A strategy owns its decision state and reacts to four hooks driven by the
//! engine. Every quality change goes through [`StrategyContext::apply`], which
//! enforces bounds, the global cooldown and the lifecycle.

use serde::{Deserialize, Serialize};

use crate::config::ConditionThresholds;
use crate::error::Result;
use crate::types::{ConditionerMode, NetworkCondition, NetworkMetrics, QualityAdjustment};

pub use crate::engine::StrategyContext;

mod constant;
mod hybrid;
mod ladder;
mod logarithmic;

pub use constant::ConstantStrategy;
pub use hybrid::{next_mode, HybridMode, HybridStrategy, LearnedProfile, SubModeProfile};
pub use ladder::{LadderAscendStrategy, LadderRung, LADDER};
pub use logarithmic::LogarithmicDescendStrategy;

/// Decision policy plugged into the engine
pub trait Strategy: Send {
    fn mode(&self) -> ConditionerMode;

    /// Classify a sample. Defaults to the engine-wide thresholds.
    fn classify(
        &self,
        metrics: &NetworkMetrics,
        thresholds: &ConditionThresholds,
    ) -> NetworkCondition {
        thresholds.classify(metrics)
    }

    /// Called once when the conditioner becomes active
    fn on_started(&mut self, _ctx: &mut StrategyContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Called once when the conditioner stops. Adjustments are refused from here on.
    fn on_stopped(&mut self, _ctx: &mut StrategyContext<'_>) {}

    /// Called for every telemetry sample, after classification
    fn on_metrics(&mut self, ctx: &mut StrategyContext<'_>, metrics: &NetworkMetrics)
        -> Result<()>;

    /// Called on every monitoring tick
    fn on_tick(&mut self, ctx: &mut StrategyContext<'_>) -> Result<()>;

    /// Called after a forced adjustment was applied
    fn on_forced(&mut self, _adjustment: &QualityAdjustment) {}

    /// Introspection snapshot
    fn state(&self) -> StrategyState;
}

/// Serialisable view of a strategy's internal state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum StrategyState {
    LogarithmicDescend {
        consecutive_excellent: u32,
        consecutive_good: u32,
    },
    LadderAscend {
        level: usize,
        stable_tier: Option<NetworkCondition>,
    },
    Hybrid {
        mode: HybridMode,
        stable_ratio: f64,
        unstable_ratio: f64,
        critical_ratio: f64,
        average_loss: f64,
        average_rtt_ms: f64,
        ascend_successes: u32,
        ascend_failures: u32,
        mode_switches: u32,
    },
    Constant {
        bitrate: u32,
        frame_rate: u32,
    },
}
