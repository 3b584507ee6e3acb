//! Constant: hold the configured quality no matter what the network does

use tokio::time::Instant;
use tracing::{debug, warn};

use super::{Strategy, StrategyContext, StrategyState};
use crate::error::Result;
use crate::types::{ConditionerMode, NetworkCondition, NetworkMetrics, QualityAdjustment};

#[derive(Debug, Default)]
pub struct ConstantStrategy {
    bitrate: u32,
    frame_rate: u32,
    critical_since: Option<Instant>,
    escalated: bool,
}

impl ConstantStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// The quality this strategy holds
    pub fn baseline(&self) -> (u32, u32) {
        (self.bitrate, self.frame_rate)
    }
}

impl Strategy for ConstantStrategy {
    fn mode(&self) -> ConditionerMode {
        ConditionerMode::Constant
    }

    fn on_started(&mut self, ctx: &mut StrategyContext<'_>) -> Result<()> {
        self.bitrate = ctx.current_bitrate();
        self.frame_rate = ctx.current_frame_rate();
        debug!(bitrate = self.bitrate, fps = self.frame_rate, "Constant baseline fixed");
        Ok(())
    }

    fn on_metrics(
        &mut self,
        ctx: &mut StrategyContext<'_>,
        metrics: &NetworkMetrics,
    ) -> Result<()> {
        let condition = ctx.condition();
        match condition {
            NetworkCondition::Critical => {
                if self.critical_since.is_none() {
                    self.critical_since = Some(ctx.now());
                    warn!(
                        loss_pct = metrics.loss_percent(),
                        rtt_ms = metrics.rtt_ms,
                        bitrate = self.bitrate,
                        "Critical network, quality is held constant"
                    );
                }
            }
            NetworkCondition::Poor => {
                self.critical_since = None;
                self.escalated = false;
                warn!(
                    loss_pct = metrics.loss_percent(),
                    rtt_ms = metrics.rtt_ms,
                    "Poor network, quality is held constant"
                );
            }
            _ => {
                self.critical_since = None;
                self.escalated = false;
            }
        }
        Ok(())
    }

    fn on_tick(&mut self, ctx: &mut StrategyContext<'_>) -> Result<()> {
        let Some(since) = self.critical_since else {
            return Ok(());
        };
        if self.escalated || ctx.condition() != NetworkCondition::Critical {
            return Ok(());
        }
        let persisted = ctx.now().saturating_duration_since(since);
        if persisted >= ctx.config().monitor_interval() {
            self.escalated = true;
            ctx.report_error(format!(
                "network critical for {}ms while holding {} bps at {} fps",
                persisted.as_millis(),
                self.bitrate,
                self.frame_rate
            ));
        }
        Ok(())
    }

    fn on_forced(&mut self, adjustment: &QualityAdjustment) {
        self.bitrate = adjustment.new_bitrate;
        self.frame_rate = adjustment.new_frame_rate;
        debug!(bitrate = self.bitrate, fps = self.frame_rate, "Constant baseline redefined");
    }

    fn state(&self) -> StrategyState {
        StrategyState::Constant {
            bitrate: self.bitrate,
            frame_rate: self.frame_rate,
        }
    }
}
