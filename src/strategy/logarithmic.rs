//! Logarithmic-Descend: cut quality multiplicatively on any sign of trouble,
//! recover slowly once the network has been good for several samples.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{Strategy, StrategyContext, StrategyState};
use crate::error::Result;
use crate::types::{scale, ConditionerMode, NetworkCondition, NetworkMetrics};

const CRITICAL_LOSS: f64 = 0.15;
const CRITICAL_RTT_MS: f64 = 300.0;
const POOR_LOSS: f64 = 0.08;
const POOR_RTT_MS: f64 = 150.0;

const DESCEND_FACTOR: f64 = 0.7;
const ASCEND_FACTOR: f64 = 1.1;
const DESCEND_INTERVAL: Duration = Duration::from_millis(1_000);
const ASCEND_INTERVAL: Duration = Duration::from_millis(8_000);

const EXCELLENT_SAMPLES_FOR_ASCEND: u32 = 3;
const GOOD_SAMPLES_FOR_ASCEND: u32 = 5;

// Frame rate is only touched at the extremes of the bitrate range
const FRAME_RATE_DROP_RATIO: f64 = 0.3;
const FRAME_RATE_DROP_FACTOR: f64 = 0.8;
const FRAME_RATE_FLOOR: u32 = 15;
const FRAME_RATE_RECOVERY_RATIO: f64 = 0.8;
const FRAME_RATE_STEP: u32 = 2;
const FRAME_RATE_CEILING: u32 = 30;

/// Ticks without telemetry before a stale-state warning
const STALE_TICKS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Severity {
    Critical,
    Poor,
}

impl Severity {
    fn of(metrics: &NetworkMetrics) -> Option<Self> {
        if metrics.packet_loss >= CRITICAL_LOSS || metrics.rtt_ms >= CRITICAL_RTT_MS {
            Some(Severity::Critical)
        } else if metrics.packet_loss >= POOR_LOSS || metrics.rtt_ms >= POOR_RTT_MS {
            Some(Severity::Poor)
        } else {
            None
        }
    }
}

#[derive(Debug, Default)]
pub struct LogarithmicDescendStrategy {
    last_descend: Option<Instant>,
    last_ascend: Option<Instant>,
    consecutive_excellent: u32,
    consecutive_good: u32,
    stale_warned: bool,
}

impl LogarithmicDescendStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset_streaks(&mut self) {
        self.consecutive_excellent = 0;
        self.consecutive_good = 0;
    }

    fn record_condition(&mut self, condition: NetworkCondition) {
        match condition {
            NetworkCondition::Excellent => {
                self.consecutive_excellent += 1;
                self.consecutive_good += 1;
            }
            NetworkCondition::Good => {
                self.consecutive_excellent = 0;
                self.consecutive_good += 1;
            }
            _ => self.reset_streaks(),
        }
    }

    fn descend(
        &mut self,
        ctx: &mut StrategyContext<'_>,
        severity: Severity,
        metrics: &NetworkMetrics,
    ) {
        let current = ctx.current_bitrate();
        let initial = ctx.initial_bitrate();
        let new_bitrate = scale(current, DESCEND_FACTOR).max(ctx.config().min_bitrate);
        if new_bitrate >= current {
            debug!(current, "Already at bitrate floor, nothing to descend");
            return;
        }

        let mut frame_rate = ctx.current_frame_rate();
        if (new_bitrate as f64) < initial as f64 * FRAME_RATE_DROP_RATIO
            && frame_rate > FRAME_RATE_FLOOR
        {
            frame_rate = scale(frame_rate, FRAME_RATE_DROP_FACTOR).max(FRAME_RATE_FLOOR);
        }

        let reason = format!(
            "{:?} network (loss {:.1}%, rtt {:.0}ms): bitrate x{}",
            severity,
            metrics.loss_percent(),
            metrics.rtt_ms,
            DESCEND_FACTOR
        );
        if ctx.apply(new_bitrate, frame_rate, &reason) {
            self.last_descend = Some(ctx.now());
        }
    }

    fn ascend_due(&self, ctx: &StrategyContext<'_>) -> bool {
        let streak_met = self.consecutive_excellent >= EXCELLENT_SAMPLES_FOR_ASCEND
            || self.consecutive_good >= GOOD_SAMPLES_FOR_ASCEND;
        let spaced = self
            .last_ascend
            .map_or(true, |at| ctx.now().saturating_duration_since(at) >= ASCEND_INTERVAL);
        streak_met && spaced && (bitrate_below_initial(ctx) || frame_rate_recoverable(ctx))
    }

    fn ascend(&mut self, ctx: &mut StrategyContext<'_>) {
        let current = ctx.current_bitrate();
        let initial = ctx.initial_bitrate();
        let new_bitrate = if current < initial {
            scale(current, ASCEND_FACTOR).min(initial)
        } else {
            current
        };

        let current_frame_rate = ctx.current_frame_rate();
        let mut frame_rate = current_frame_rate;
        if recovers_frame_rate(new_bitrate, initial) && frame_rate < FRAME_RATE_CEILING {
            frame_rate = (frame_rate + FRAME_RATE_STEP).min(FRAME_RATE_CEILING);
        }
        if new_bitrate == current && frame_rate == current_frame_rate {
            return;
        }

        let reason = if new_bitrate > current {
            format!(
                "Stable network ({} excellent / {} good samples): bitrate x{}",
                self.consecutive_excellent, self.consecutive_good, ASCEND_FACTOR
            )
        } else {
            format!(
                "Stable network ({} excellent / {} good samples): frame rate +{}",
                self.consecutive_excellent, self.consecutive_good, FRAME_RATE_STEP
            )
        };
        if ctx.apply(new_bitrate, frame_rate, &reason) {
            self.last_ascend = Some(ctx.now());
            self.reset_streaks();
        }
    }
}

fn recovers_frame_rate(bitrate: u32, initial: u32) -> bool {
    bitrate as f64 >= initial as f64 * FRAME_RATE_RECOVERY_RATIO
}

fn bitrate_below_initial(ctx: &StrategyContext<'_>) -> bool {
    ctx.current_bitrate() < ctx.initial_bitrate()
}

/// Bitrate is back near its initial value but frame rate is still reduced
fn frame_rate_recoverable(ctx: &StrategyContext<'_>) -> bool {
    ctx.current_frame_rate() < FRAME_RATE_CEILING
        && recovers_frame_rate(ctx.current_bitrate(), ctx.initial_bitrate())
}

impl Strategy for LogarithmicDescendStrategy {
    fn mode(&self) -> ConditionerMode {
        ConditionerMode::LogarithmicDescend
    }

    fn on_metrics(
        &mut self,
        ctx: &mut StrategyContext<'_>,
        metrics: &NetworkMetrics,
    ) -> Result<()> {
        self.stale_warned = false;

        if let Some(severity) = Severity::of(metrics) {
            self.reset_streaks();
            if severity == Severity::Poor {
                if let Some(last) = self.last_descend {
                    if ctx.now().saturating_duration_since(last) < DESCEND_INTERVAL {
                        debug!("Poor network but descended recently, holding");
                        return Ok(());
                    }
                }
            }
            self.descend(ctx, severity, metrics);
            return Ok(());
        }

        self.record_condition(ctx.condition());
        if self.ascend_due(ctx) {
            self.ascend(ctx);
        }
        Ok(())
    }

    fn on_tick(&mut self, ctx: &mut StrategyContext<'_>) -> Result<()> {
        let stale_after = ctx.config().monitor_interval() * STALE_TICKS;
        let last = ctx.last_metrics_at().unwrap_or_else(|| ctx.started_at());
        if !self.stale_warned && ctx.now().saturating_duration_since(last) >= stale_after {
            warn!(
                stale_ms = ctx.now().saturating_duration_since(last).as_millis() as u64,
                bitrate = ctx.current_bitrate(),
                "No telemetry received recently, holding current quality"
            );
            self.stale_warned = true;
        }
        Ok(())
    }

    fn state(&self) -> StrategyState {
        StrategyState::LogarithmicDescend {
            consecutive_excellent: self.consecutive_excellent,
            consecutive_good: self.consecutive_good,
        }
    }
}
