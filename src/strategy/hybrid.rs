//! Hybrid: observe the network for a learning window, then settle into the
//! sub-mode that suits it and keep re-checking that choice against how well
//! ascends hold up.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use super::{Strategy, StrategyContext, StrategyState};
use crate::error::Result;
use crate::types::{scale, ConditionerMode, NetworkMetrics};

const LEARNING_WINDOW: Duration = Duration::from_millis(30_000);
const EVALUATION_INTERVAL: Duration = Duration::from_millis(15_000);
const MIN_TRACKED_ASCENDS: u32 = 5;
const DESCEND_COOLDOWN: Duration = Duration::from_millis(1_500);

// Sample classes
const CRITICAL_LOSS: f64 = 0.25;
const CRITICAL_RTT_MS: f64 = 400.0;
const UNSTABLE_LOSS: f64 = 0.12;
const UNSTABLE_RTT_MS: f64 = 200.0;

// Ascend gate
const ASCEND_MAX_LOSS: f64 = 0.03;
const ASCEND_MAX_RTT_MS: f64 = 80.0;

// Learning decision ratios
const CONSERVATIVE_MIN_STABLE: f64 = 0.70;
const CONSERVATIVE_MAX_CRITICAL: f64 = 0.10;
const AGGRESSIVE_MIN_CRITICAL: f64 = 0.30;
const AGGRESSIVE_MIN_UNSTABLE: f64 = 0.50;

// Re-evaluation success rates
const LOW_SUCCESS_RATE: f64 = 0.30;
const HIGH_SUCCESS_RATE: f64 = 0.80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HybridMode {
    Learning,
    Conservative,
    Aggressive,
    Balanced,
}

impl fmt::Display for HybridMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HybridMode::Learning => "learning",
            HybridMode::Conservative => "conservative",
            HybridMode::Aggressive => "aggressive",
            HybridMode::Balanced => "balanced",
        };
        f.write_str(name)
    }
}

/// Tuning of one sub-mode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubModeProfile {
    pub ascend_factor: f64,
    pub descend_factor: f64,
    /// Minimum time since the last hybrid change before climbing
    pub ascend_delay: Duration,
    /// Loss at or above which a non-critical sample still triggers a descend
    pub secondary_loss: f64,
    pub secondary_rtt_ms: f64,
}

impl SubModeProfile {
    pub fn for_mode(mode: HybridMode) -> Self {
        match mode {
            HybridMode::Conservative => Self {
                ascend_factor: 1.12,
                descend_factor: 0.80,
                ascend_delay: Duration::from_millis(8_000),
                secondary_loss: CRITICAL_LOSS * 0.8,
                secondary_rtt_ms: CRITICAL_RTT_MS * 0.8,
            },
            HybridMode::Aggressive => Self {
                ascend_factor: 1.05,
                descend_factor: 0.65,
                ascend_delay: Duration::from_millis(12_000),
                secondary_loss: UNSTABLE_LOSS,
                secondary_rtt_ms: UNSTABLE_RTT_MS,
            },
            HybridMode::Balanced => Self {
                ascend_factor: 1.08,
                descend_factor: 0.75,
                ascend_delay: Duration::from_millis(6_000),
                secondary_loss: UNSTABLE_LOSS * 1.2,
                secondary_rtt_ms: UNSTABLE_RTT_MS * 1.2,
            },
            // Shared defaults while the network is still being observed
            HybridMode::Learning => Self {
                ascend_delay: Duration::from_millis(10_000),
                ..Self::for_mode(HybridMode::Balanced)
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SampleClass {
    Stable,
    Unstable,
    Critical,
}

impl SampleClass {
    fn of(metrics: &NetworkMetrics) -> Self {
        if metrics.packet_loss >= CRITICAL_LOSS || metrics.rtt_ms >= CRITICAL_RTT_MS {
            SampleClass::Critical
        } else if metrics.packet_loss >= UNSTABLE_LOSS || metrics.rtt_ms >= UNSTABLE_RTT_MS {
            SampleClass::Unstable
        } else {
            SampleClass::Stable
        }
    }
}

/// Running sample statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LearnedProfile {
    pub stable: u32,
    pub unstable: u32,
    pub critical: u32,
    loss_sum: f64,
    rtt_sum: f64,
}

impl LearnedProfile {
    fn record(&mut self, class: SampleClass, metrics: &NetworkMetrics) {
        match class {
            SampleClass::Stable => self.stable += 1,
            SampleClass::Unstable => self.unstable += 1,
            SampleClass::Critical => self.critical += 1,
        }
        self.loss_sum += metrics.packet_loss;
        self.rtt_sum += metrics.rtt_ms;
    }

    pub fn samples(&self) -> u32 {
        self.stable + self.unstable + self.critical
    }

    fn ratio(&self, count: u32) -> f64 {
        match self.samples() {
            0 => 0.0,
            n => count as f64 / n as f64,
        }
    }

    pub fn stable_ratio(&self) -> f64 {
        self.ratio(self.stable)
    }

    pub fn unstable_ratio(&self) -> f64 {
        self.ratio(self.unstable)
    }

    pub fn critical_ratio(&self) -> f64 {
        self.ratio(self.critical)
    }

    pub fn average_loss(&self) -> f64 {
        match self.samples() {
            0 => 0.0,
            n => self.loss_sum / n as f64,
        }
    }

    pub fn average_rtt_ms(&self) -> f64 {
        match self.samples() {
            0 => 0.0,
            n => self.rtt_sum / n as f64,
        }
    }

    /// Sub-mode to leave Learning into. No samples means no evidence either
    /// way, which lands on Balanced.
    pub fn recommend(&self) -> HybridMode {
        if self.samples() == 0 {
            return HybridMode::Balanced;
        }
        if self.stable_ratio() > CONSERVATIVE_MIN_STABLE
            && self.critical_ratio() < CONSERVATIVE_MAX_CRITICAL
        {
            HybridMode::Conservative
        } else if self.critical_ratio() > AGGRESSIVE_MIN_CRITICAL
            || self.unstable_ratio() > AGGRESSIVE_MIN_UNSTABLE
        {
            HybridMode::Aggressive
        } else {
            HybridMode::Balanced
        }
    }
}

/// Sub-mode after a re-evaluation with the given ascend success rate
pub fn next_mode(mode: HybridMode, success_rate: f64) -> HybridMode {
    match mode {
        HybridMode::Learning => HybridMode::Learning,
        HybridMode::Conservative if success_rate < LOW_SUCCESS_RATE => HybridMode::Aggressive,
        HybridMode::Aggressive if success_rate > HIGH_SUCCESS_RATE => HybridMode::Conservative,
        other => other,
    }
}

#[derive(Debug)]
pub struct HybridStrategy {
    mode: HybridMode,
    learned: LearnedProfile,
    learning_started: Option<Instant>,
    learning_ended: Option<Instant>,
    last_evaluation: Option<Instant>,
    last_descend: Option<Instant>,
    /// Last hybrid ascend or descend
    last_change: Option<Instant>,
    awaiting_outcome: bool,
    ascend_successes: u32,
    ascend_failures: u32,
    mode_switches: u32,
}

impl Default for HybridStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl HybridStrategy {
    pub fn new() -> Self {
        Self {
            mode: HybridMode::Learning,
            learned: LearnedProfile::default(),
            learning_started: None,
            learning_ended: None,
            last_evaluation: None,
            last_descend: None,
            last_change: None,
            awaiting_outcome: false,
            ascend_successes: 0,
            ascend_failures: 0,
            mode_switches: 0,
        }
    }

    pub fn sub_mode(&self) -> HybridMode {
        self.mode
    }

    pub fn learned(&self) -> &LearnedProfile {
        &self.learned
    }

    fn profile(&self) -> SubModeProfile {
        SubModeProfile::for_mode(self.mode)
    }

    fn success_rate(&self) -> f64 {
        let total = self.ascend_successes + self.ascend_failures;
        if total == 0 {
            0.0
        } else {
            self.ascend_successes as f64 / total as f64
        }
    }

    fn switch_to(&mut self, mode: HybridMode, why: &str) {
        if mode == self.mode {
            return;
        }
        info!(from = %self.mode, to = %mode, "Hybrid switching sub-mode: {}", why);
        self.mode = mode;
        self.mode_switches += 1;
        self.ascend_successes = 0;
        self.ascend_failures = 0;
        self.awaiting_outcome = false;
    }

    fn maybe_finish_learning(&mut self, now: Instant) {
        if self.mode != HybridMode::Learning {
            return;
        }
        let Some(started) = self.learning_started else {
            return;
        };
        if now.saturating_duration_since(started) < LEARNING_WINDOW {
            return;
        }
        let chosen = self.learned.recommend();
        let why = format!(
            "learned stable {:.0}% unstable {:.0}% critical {:.0}% over {} samples",
            self.learned.stable_ratio() * 100.0,
            self.learned.unstable_ratio() * 100.0,
            self.learned.critical_ratio() * 100.0,
            self.learned.samples()
        );
        self.switch_to(chosen, &why);
        self.learning_ended = Some(now);
    }

    fn maybe_reevaluate(&mut self, now: Instant) {
        if self.mode == HybridMode::Learning {
            return;
        }
        let reference = self.last_evaluation.or(self.learning_ended);
        if let Some(at) = reference {
            if now.saturating_duration_since(at) < EVALUATION_INTERVAL {
                return;
            }
        }
        let tracked = self.ascend_successes + self.ascend_failures;
        if tracked < MIN_TRACKED_ASCENDS {
            return;
        }

        self.last_evaluation = Some(now);
        let rate = self.success_rate();
        let next = next_mode(self.mode, rate);
        debug!(
            mode = %self.mode,
            success_rate = rate,
            tracked,
            "Hybrid re-evaluation"
        );
        if next != self.mode {
            let why = format!("ascend success rate {:.0}% over {} ascends", rate * 100.0, tracked);
            self.switch_to(next, &why);
        }
    }

    fn descend(
        &mut self,
        ctx: &mut StrategyContext<'_>,
        metrics: &NetworkMetrics,
        class: SampleClass,
    ) {
        let now = ctx.now();
        if let Some(last) = self.last_descend {
            if now.saturating_duration_since(last) < DESCEND_COOLDOWN {
                debug!("Hybrid descend suppressed by its own cooldown");
                return;
            }
        }
        let profile = self.profile();
        let current = ctx.current_bitrate();
        let target = scale(current, profile.descend_factor).max(ctx.config().min_bitrate);
        if target >= current {
            return;
        }
        let reason = format!(
            "Hybrid/{} {:?} sample (loss {:.1}%, rtt {:.0}ms): bitrate x{}",
            self.mode,
            class,
            metrics.loss_percent(),
            metrics.rtt_ms,
            profile.descend_factor
        );
        let frame_rate = ctx.current_frame_rate();
        if ctx.apply(target, frame_rate, &reason) {
            self.last_descend = Some(now);
            self.last_change = Some(now);
        }
    }

    fn ascend(&mut self, ctx: &mut StrategyContext<'_>) {
        let now = ctx.now();
        let profile = self.profile();
        let reference = self.last_change.unwrap_or_else(|| ctx.started_at());
        if now.saturating_duration_since(reference) < profile.ascend_delay {
            return;
        }
        let current = ctx.current_bitrate();
        let initial = ctx.initial_bitrate();
        let target = scale(current, profile.ascend_factor).min(initial);
        if target <= current {
            return;
        }
        let reason = format!(
            "Hybrid/{} stable network: bitrate x{}",
            self.mode, profile.ascend_factor
        );
        let frame_rate = ctx.current_frame_rate();
        if ctx.apply(target, frame_rate, &reason) {
            self.last_change = Some(now);
            self.awaiting_outcome = true;
        }
    }
}

impl Strategy for HybridStrategy {
    fn mode(&self) -> ConditionerMode {
        ConditionerMode::Hybrid
    }

    fn on_started(&mut self, ctx: &mut StrategyContext<'_>) -> Result<()> {
        self.learning_started = Some(ctx.started_at());
        info!(window_ms = LEARNING_WINDOW.as_millis() as u64, "Hybrid learning started");
        Ok(())
    }

    fn on_metrics(
        &mut self,
        ctx: &mut StrategyContext<'_>,
        metrics: &NetworkMetrics,
    ) -> Result<()> {
        let now = ctx.now();
        let class = SampleClass::of(metrics);
        self.learned.record(class, metrics);

        if self.awaiting_outcome {
            self.awaiting_outcome = false;
            if class == SampleClass::Stable {
                self.ascend_successes += 1;
            } else {
                self.ascend_failures += 1;
            }
        }

        self.maybe_finish_learning(now);
        self.maybe_reevaluate(now);

        let profile = self.profile();
        if class == SampleClass::Critical
            || metrics.packet_loss >= profile.secondary_loss
            || metrics.rtt_ms >= profile.secondary_rtt_ms
        {
            self.descend(ctx, metrics, class);
        } else if metrics.packet_loss <= ASCEND_MAX_LOSS
            && metrics.rtt_ms <= ASCEND_MAX_RTT_MS
            && ctx.current_bitrate() < ctx.initial_bitrate()
        {
            self.ascend(ctx);
        }
        Ok(())
    }

    fn on_tick(&mut self, ctx: &mut StrategyContext<'_>) -> Result<()> {
        let now = ctx.now();
        self.maybe_finish_learning(now);
        self.maybe_reevaluate(now);
        Ok(())
    }

    fn state(&self) -> StrategyState {
        StrategyState::Hybrid {
            mode: self.mode,
            stable_ratio: self.learned.stable_ratio(),
            unstable_ratio: self.learned.unstable_ratio(),
            critical_ratio: self.learned.critical_ratio(),
            average_loss: self.learned.average_loss(),
            average_rtt_ms: self.learned.average_rtt_ms(),
            ascend_successes: self.ascend_successes,
            ascend_failures: self.ascend_failures,
            mode_switches: self.mode_switches,
        }
    }
}
