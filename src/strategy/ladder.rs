//! Ladder-Ascend: discrete quality rungs, quick to step down, slow to climb

use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::{Strategy, StrategyContext, StrategyState};
use crate::config::{ConditionThresholds, TierBound};
use crate::error::Result;
use crate::types::{scale, ConditionerMode, NetworkCondition, NetworkMetrics};

/// One quality step, relative to the bitrate the session started with
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LadderRung {
    pub fraction: f64,
    pub frame_rate: u32,
}

impl LadderRung {
    pub const fn new(fraction: f64, frame_rate: u32) -> Self {
        Self {
            fraction,
            frame_rate,
        }
    }

    fn bitrate(&self, initial: u32) -> u32 {
        scale(initial, self.fraction)
    }
}

pub const LADDER: [LadderRung; 6] = [
    LadderRung::new(0.30, 15),
    LadderRung::new(0.45, 15),
    LadderRung::new(0.60, 24),
    LadderRung::new(0.75, 24),
    LadderRung::new(0.90, 30),
    LadderRung::new(1.00, 30),
];

const TOP: usize = LADDER.len() - 1;

/// Tighter tiers than the engine default; anything past `poor` is Critical
const LADDER_THRESHOLDS: ConditionThresholds = ConditionThresholds {
    excellent: TierBound::new(0.02, 50.0),
    good: TierBound::new(0.05, 100.0),
    fair: TierBound::new(0.12, 250.0),
    poor: TierBound::new(0.25, 500.0),
};

const DESCEND_INTERVAL: Duration = Duration::from_millis(2_000);
const ASCEND_INTERVAL: Duration = Duration::from_millis(10_000);
const STABILITY_HOLD: Duration = Duration::from_millis(15_000);

const MODERATE_LOSS: f64 = 0.15;
const SEVERE_LOSS: f64 = 0.25;

/// Rungs to drop for a sample that calls for a descend
fn descend_steps(condition: NetworkCondition, metrics: &NetworkMetrics) -> usize {
    if condition == NetworkCondition::Critical || metrics.packet_loss >= SEVERE_LOSS {
        3
    } else if metrics.packet_loss >= MODERATE_LOSS {
        2
    } else {
        1
    }
}

#[derive(Debug)]
pub struct LadderAscendStrategy {
    level: usize,
    last_descend: Option<Instant>,
    last_ascend: Option<Instant>,
    /// Tier of the current uninterrupted run of samples, and when it began
    stable_tier: Option<(NetworkCondition, Instant)>,
}

impl Default for LadderAscendStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl LadderAscendStrategy {
    pub fn new() -> Self {
        Self {
            level: TOP,
            last_descend: None,
            last_ascend: None,
            stable_tier: None,
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    /// Apply the quality of `level`. The rung is taken even if clamping made
    /// the change a no-op, so the ladder never drifts from the encoder.
    fn move_to(&mut self, ctx: &mut StrategyContext<'_>, level: usize, reason: &str) -> bool {
        let rung = LADDER[level];
        let bitrate = rung.bitrate(ctx.initial_bitrate());
        let applied = ctx.apply(bitrate, rung.frame_rate, reason);
        let already_there = ctx.current_bitrate() == ctx.config().clamp_bitrate(bitrate)
            && ctx.current_frame_rate() == ctx.config().clamp_frame_rate(rung.frame_rate);
        if applied || already_there {
            self.level = level;
            true
        } else {
            false
        }
    }

    fn should_descend(&self, condition: NetworkCondition) -> bool {
        condition.is_degraded() || (condition == NetworkCondition::Fair && self.level >= 4)
    }

    fn track_stability(&mut self, condition: NetworkCondition, now: Instant) {
        match self.stable_tier {
            Some((tier, _)) if tier == condition => {}
            _ => self.stable_tier = Some((condition, now)),
        }
    }

    fn try_ascend(&mut self, ctx: &mut StrategyContext<'_>) {
        let Some((tier, since)) = self.stable_tier else {
            return;
        };
        let now = ctx.now();
        if !tier.is_good() || self.level >= TOP {
            return;
        }
        let held = now.saturating_duration_since(since);
        if held < STABILITY_HOLD {
            return;
        }
        if let Some(last) = self.last_ascend {
            if now.saturating_duration_since(last) < ASCEND_INTERVAL {
                return;
            }
        }

        let target = self.level + 1;
        let reason = format!(
            "Network {} for {}s: climbing to rung {} ({:.0}%)",
            tier,
            held.as_secs(),
            target,
            LADDER[target].fraction * 100.0
        );
        if self.move_to(ctx, target, &reason) {
            self.last_ascend = Some(now);
            self.stable_tier = Some((tier, now));
        }
    }
}

impl Strategy for LadderAscendStrategy {
    fn mode(&self) -> ConditionerMode {
        ConditionerMode::LadderAscend
    }

    fn classify(
        &self,
        metrics: &NetworkMetrics,
        _thresholds: &ConditionThresholds,
    ) -> NetworkCondition {
        LADDER_THRESHOLDS.classify(metrics)
    }

    fn on_started(&mut self, ctx: &mut StrategyContext<'_>) -> Result<()> {
        self.level = TOP;
        self.stable_tier = None;
        debug!(initial_bps = ctx.initial_bitrate(), "Ladder starting at top rung");
        Ok(())
    }

    fn on_metrics(
        &mut self,
        ctx: &mut StrategyContext<'_>,
        metrics: &NetworkMetrics,
    ) -> Result<()> {
        let now = ctx.now();
        let condition = ctx.condition();

        let descend_due = self
            .last_descend
            .map_or(true, |at| now.saturating_duration_since(at) >= DESCEND_INTERVAL);
        if self.should_descend(condition) && descend_due {
            if self.level == 0 {
                debug!(%condition, "Already on the bottom rung");
                self.stable_tier = Some((condition, now));
                return Ok(());
            }
            let steps = descend_steps(condition, metrics);
            let target = self.level.saturating_sub(steps);
            let reason = format!(
                "Network {} (loss {:.1}%, rtt {:.0}ms): dropping {} rung(s) to {}",
                condition,
                metrics.loss_percent(),
                metrics.rtt_ms,
                self.level - target,
                target
            );
            if self.move_to(ctx, target, &reason) {
                self.last_descend = Some(now);
                self.stable_tier = Some((condition, now));
            }
            return Ok(());
        }

        self.track_stability(condition, now);
        self.try_ascend(ctx);
        Ok(())
    }

    fn on_tick(&mut self, ctx: &mut StrategyContext<'_>) -> Result<()> {
        self.try_ascend(ctx);
        Ok(())
    }

    fn state(&self) -> StrategyState {
        StrategyState::LadderAscend {
            level: self.level,
            stable_tier: self.stable_tier.map(|(tier, _)| tier),
        }
    }
}
