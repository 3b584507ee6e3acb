//! Base conditioner engine
//!
//! Owns the lifecycle, the monitoring task, classification, bounds clamping,
//! cooldown bookkeeping and statistics. Decisions are delegated to a boxed
//! [`Strategy`].
//!
//! Locking: the strategy mutex is always taken before the core mutex. Getters
//! only touch the core mutex, so they never wait on streamer I/O. Callback
//! events are queued while locks are held and dispatched afterwards.

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::conditioner::{ConditionerCallback, StreamConditioner, Streamer};
use crate::config::ConditionerConfig;
use crate::error::{ConditionerError, Result};
use crate::strategy::{HybridMode, Strategy, StrategyState};
use crate::types::{
    ConditionerMode, ConditionerState, ConditionerStats, NetworkCondition, NetworkMetrics,
    QualityAdjustment,
};

enum Event {
    Adjusted(QualityAdjustment),
    ConditionChanged(NetworkCondition),
    Error(String),
}

struct Core {
    lifecycle: ConditionerState,
    bitrate: u32,
    frame_rate: u32,
    initial_bitrate: u32,
    condition: NetworkCondition,
    last_adjustment: Option<Instant>,
    last_metrics: Option<(Instant, NetworkMetrics)>,
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
    streamer: Option<Arc<dyn Streamer>>,
    connection_ids: Vec<String>,
    stats: ConditionerStats,
    condition_score_sum: u64,
}

impl Core {
    fn new(config: &ConditionerConfig) -> Self {
        Self {
            lifecycle: ConditionerState::Idle,
            bitrate: 0,
            frame_rate: config.default_frame_rate,
            initial_bitrate: 0,
            condition: NetworkCondition::Good,
            last_adjustment: None,
            last_metrics: None,
            started_at: None,
            stopped_at: None,
            streamer: None,
            connection_ids: Vec::new(),
            stats: ConditionerStats::default(),
            condition_score_sum: 0,
        }
    }

    fn is_active(&self) -> bool {
        self.lifecycle == ConditionerState::Active
    }

    fn uptime(&self, now: Instant) -> Duration {
        match (self.started_at, self.stopped_at) {
            (Some(start), Some(stop)) => stop.duration_since(start),
            (Some(start), None) => now.duration_since(start),
            _ => Duration::ZERO,
        }
    }

    fn snapshot_stats(&self, now: Instant) -> ConditionerStats {
        let mut stats = self.stats.clone();
        stats.uptime_ms = self.uptime(now).as_millis() as u64;
        if stats.metric_samples > 0 {
            stats.average_condition = NetworkCondition::from_score(
                self.condition_score_sum as f64 / stats.metric_samples as f64,
            );
        }
        stats
    }
}

struct Shared {
    mode: ConditionerMode,
    config: ConditionerConfig,
    core: Mutex<Core>,
    strategy: Mutex<Box<dyn Strategy>>,
    callback: RwLock<Option<Arc<dyn ConditionerCallback>>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    /// The shared adjustment path. Returns the applied adjustment, or `None`
    /// when it was refused (inactive, cooldown, or no change after clamping).
    fn apply_adjustment(
        &self,
        events: &mut Vec<Event>,
        now: Instant,
        bitrate: u32,
        frame_rate: u32,
        reason: &str,
        forced: bool,
    ) -> Option<QualityAdjustment> {
        let (adjustment, streamer) = {
            let mut core = self.core.lock();
            if !core.is_active() {
                debug!(mode = %self.mode, reason, "Dropping adjustment, conditioner not active");
                return None;
            }
            if !forced {
                if let Some(last) = core.last_adjustment {
                    let since = now.saturating_duration_since(last);
                    if since < self.config.adjustment_cooldown() {
                        core.stats.rejected_adjustments += 1;
                        debug!(
                            mode = %self.mode,
                            reason,
                            since_ms = since.as_millis() as u64,
                            "Adjustment rejected by cooldown"
                        );
                        return None;
                    }
                }
            }

            let bitrate = self.config.clamp_bitrate(bitrate);
            let frame_rate = self.config.clamp_frame_rate(frame_rate);
            if bitrate == core.bitrate && frame_rate == core.frame_rate {
                trace!(mode = %self.mode, reason, "Adjustment is a no-op after clamping");
                return None;
            }

            let adjustment = QualityAdjustment {
                new_bitrate: bitrate,
                new_frame_rate: frame_rate,
                previous_bitrate: core.bitrate,
                previous_frame_rate: core.frame_rate,
                reason: reason.to_string(),
                condition: core.condition,
                forced,
                timestamp: Utc::now(),
            };

            core.bitrate = bitrate;
            core.frame_rate = frame_rate;
            core.last_adjustment = Some(now);
            core.stats.total_adjustments += 1;
            if adjustment.is_increase() {
                core.stats.increase_adjustments += 1;
            } else if adjustment.is_decrease() {
                core.stats.decrease_adjustments += 1;
            }
            if adjustment.frame_rate_changed() {
                core.stats.frame_rate_changes += 1;
            }
            (adjustment, core.streamer.clone())
        };

        info!(
            mode = %self.mode,
            from_bps = adjustment.previous_bitrate,
            to_bps = adjustment.new_bitrate,
            from_fps = adjustment.previous_frame_rate,
            to_fps = adjustment.new_frame_rate,
            forced,
            "{}",
            adjustment.reason
        );

        // Local state stays authoritative even if the push fails
        if let Some(streamer) = streamer {
            let mut failures = Vec::new();
            if adjustment.new_bitrate != adjustment.previous_bitrate {
                if let Err(e) = streamer.set_bitrate(adjustment.new_bitrate) {
                    let e = e.context(format!("failed to set bitrate {}", adjustment.new_bitrate));
                    failures.push(ConditionerError::Streamer(e));
                }
            }
            if adjustment.frame_rate_changed() {
                if let Err(e) = streamer.set_frame_rate(adjustment.new_frame_rate) {
                    let e = e.context(format!(
                        "failed to set frame rate {}",
                        adjustment.new_frame_rate
                    ));
                    failures.push(ConditionerError::Streamer(e));
                }
            }
            if !failures.is_empty() {
                self.core.lock().stats.streamer_failures += 1;
                for failure in failures {
                    warn!(mode = %self.mode, "{}", failure);
                    events.push(Event::Error(failure.to_string()));
                }
            }
        }

        events.push(Event::Adjusted(adjustment.clone()));
        Some(adjustment)
    }

    fn dispatch(&self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        let callback = self.callback.read().clone();
        let Some(callback) = callback else {
            return;
        };
        for event in events {
            match event {
                Event::Adjusted(adjustment) => callback.on_quality_adjusted(&adjustment),
                Event::ConditionChanged(condition) => {
                    callback.on_network_condition_changed(condition)
                }
                Event::Error(message) => callback.on_conditioner_error(&message),
            }
        }
    }

    /// One monitoring tick. Returns false once the conditioner is no longer active.
    fn run_tick(&self) -> bool {
        let mut events = Vec::new();
        {
            let mut strategy = self.strategy.lock();
            if !self.core.lock().is_active() {
                return false;
            }
            let mut ctx = StrategyContext::new(self, Instant::now(), &mut events);
            if let Err(e) = strategy.on_tick(&mut ctx) {
                warn!(mode = %self.mode, "Monitoring check failed: {}", e);
                events.push(Event::Error(format!("monitoring check failed: {}", e)));
            }
        }
        self.dispatch(events);
        true
    }

    fn spawn_monitor(self: &Arc<Self>, runtime: &tokio::runtime::Handle) -> JoinHandle<()> {
        let weak: Weak<Shared> = Arc::downgrade(self);
        let interval = self.config.monitor_interval();
        let first_tick = Instant::now() + interval;
        runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(first_tick, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                if !shared.run_tick() {
                    debug!(mode = %shared.mode, "Monitoring task exiting");
                    break;
                }
            }
        })
    }
}

/// What a strategy sees of the engine while one of its hooks runs
pub struct StrategyContext<'a> {
    shared: &'a Shared,
    now: Instant,
    events: &'a mut Vec<Event>,
}

impl<'a> StrategyContext<'a> {
    fn new(shared: &'a Shared, now: Instant, events: &'a mut Vec<Event>) -> Self {
        Self {
            shared,
            now,
            events,
        }
    }

    /// Time at which the current trigger fired
    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn config(&self) -> &ConditionerConfig {
        &self.shared.config
    }

    /// When the conditioner became active
    pub fn started_at(&self) -> Instant {
        self.shared.core.lock().started_at.unwrap_or(self.now)
    }

    /// The quality ceiling captured at start
    pub fn initial_bitrate(&self) -> u32 {
        self.shared.core.lock().initial_bitrate
    }

    pub fn current_bitrate(&self) -> u32 {
        self.shared.core.lock().bitrate
    }

    pub fn current_frame_rate(&self) -> u32 {
        self.shared.core.lock().frame_rate
    }

    pub fn condition(&self) -> NetworkCondition {
        self.shared.core.lock().condition
    }

    /// Time of the most recent telemetry sample
    pub fn last_metrics_at(&self) -> Option<Instant> {
        self.shared.core.lock().last_metrics.map(|(at, _)| at)
    }

    /// Request a quality change through the shared adjustment path.
    /// Returns true if it was applied.
    pub fn apply(&mut self, bitrate: u32, frame_rate: u32, reason: &str) -> bool {
        self.shared
            .apply_adjustment(self.events, self.now, bitrate, frame_rate, reason, false)
            .is_some()
    }

    /// Surface a problem through `on_conditioner_error`
    pub fn report_error(&mut self, message: impl Into<String>) {
        self.events.push(Event::Error(message.into()));
    }
}

/// A conditioner: the engine plus one strategy
pub struct Conditioner {
    shared: Arc<Shared>,
}

impl Conditioner {
    pub fn new(strategy: Box<dyn Strategy>, config: ConditionerConfig) -> Self {
        let mode = strategy.mode();
        Self {
            shared: Arc::new(Shared {
                mode,
                core: Mutex::new(Core::new(&config)),
                config,
                strategy: Mutex::new(strategy),
                callback: RwLock::new(None),
                monitor: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ConditionerConfig {
        &self.shared.config
    }

    pub fn lifecycle(&self) -> ConditionerState {
        self.shared.core.lock().lifecycle
    }

    /// Current (bitrate, frame rate), read together
    pub fn current_quality(&self) -> (u32, u32) {
        let core = self.shared.core.lock();
        (core.bitrate, core.frame_rate)
    }

    pub fn initial_bitrate(&self) -> u32 {
        self.shared.core.lock().initial_bitrate
    }

    pub fn connection_ids(&self) -> Vec<String> {
        self.shared.core.lock().connection_ids.clone()
    }

    /// Latest clamped telemetry sample
    pub fn last_metrics(&self) -> Option<NetworkMetrics> {
        self.shared.core.lock().last_metrics.map(|(_, m)| m)
    }

    pub fn strategy_state(&self) -> StrategyState {
        self.shared.strategy.lock().state()
    }

    /// Hybrid sub-mode, `None` for other strategies
    pub fn hybrid_mode(&self) -> Option<HybridMode> {
        match self.strategy_state() {
            StrategyState::Hybrid { mode, .. } => Some(mode),
            _ => None,
        }
    }

    /// Ladder rung, `None` for other strategies
    pub fn ladder_level(&self) -> Option<usize> {
        match self.strategy_state() {
            StrategyState::LadderAscend { level, .. } => Some(level),
            _ => None,
        }
    }

    fn abort_monitor(&self) {
        if let Some(handle) = self.shared.monitor.lock().take() {
            handle.abort();
        }
    }
}

impl StreamConditioner for Conditioner {
    fn start(
        &self,
        streamer: Arc<dyn Streamer>,
        initial_bitrate: u32,
        connection_ids: Vec<String>,
    ) -> Result<()> {
        let shared = &self.shared;
        let mut events = Vec::new();
        {
            let mut strategy = shared.strategy.lock();
            {
                let mut core = shared.core.lock();
                if core.lifecycle != ConditionerState::Idle {
                    warn!(
                        mode = %shared.mode,
                        state = ?core.lifecycle,
                        "start() ignored, conditioner is not idle"
                    );
                    return Ok(());
                }
                let runtime = tokio::runtime::Handle::try_current()
                    .map_err(|_| ConditionerError::NoRuntime)?;

                let now = Instant::now();
                let initial = shared.config.clamp_bitrate(initial_bitrate);
                streamer.bind_connections(&connection_ids);

                core.lifecycle = ConditionerState::Active;
                core.started_at = Some(now);
                core.initial_bitrate = initial;
                core.bitrate = initial;
                core.frame_rate = shared.config.clamp_frame_rate(shared.config.default_frame_rate);
                core.streamer = Some(streamer);
                core.connection_ids = connection_ids;

                *shared.monitor.lock() = Some(shared.spawn_monitor(&runtime));

                info!(
                    mode = %shared.mode,
                    initial_bps = initial,
                    fps = core.frame_rate,
                    connections = core.connection_ids.len(),
                    "Conditioner started"
                );
            }
            let mut ctx = StrategyContext::new(shared, Instant::now(), &mut events);
            if let Err(e) = strategy.on_started(&mut ctx) {
                warn!(mode = %shared.mode, "Strategy start hook failed: {}", e);
                events.push(Event::Error(format!("strategy start failed: {}", e)));
            }
        }
        shared.dispatch(events);
        Ok(())
    }

    fn stop(&self) {
        let shared = &self.shared;
        let mut events = Vec::new();
        {
            let mut strategy = shared.strategy.lock();
            {
                let mut core = shared.core.lock();
                match core.lifecycle {
                    ConditionerState::Active => {}
                    ConditionerState::Idle => {
                        warn!(mode = %shared.mode, "stop() called before start()");
                        return;
                    }
                    ConditionerState::Stopped => {
                        debug!(mode = %shared.mode, "stop() called on a stopped conditioner");
                        return;
                    }
                }
                let now = Instant::now();
                core.lifecycle = ConditionerState::Stopped;
                core.stopped_at = Some(now);
                info!(
                    mode = %shared.mode,
                    adjustments = core.stats.total_adjustments,
                    uptime_ms = core.uptime(now).as_millis() as u64,
                    "Conditioner stopped"
                );
            }
            self.abort_monitor();
            let mut ctx = StrategyContext::new(shared, Instant::now(), &mut events);
            strategy.on_stopped(&mut ctx);
        }
        shared.dispatch(events);
    }

    fn update_network_metrics(&self, packet_loss: f64, rtt_ms: f64, bandwidth_bps: f64) {
        let shared = &self.shared;
        let metrics = NetworkMetrics::clamped(packet_loss, rtt_ms, bandwidth_bps);
        let mut events = Vec::new();
        {
            let mut strategy = shared.strategy.lock();
            let now = Instant::now();
            let condition = strategy.classify(&metrics, &shared.config.thresholds);
            {
                let mut core = shared.core.lock();
                if !core.is_active() {
                    trace!(mode = %shared.mode, "Ignoring metrics, conditioner not active");
                    return;
                }
                core.last_metrics = Some((now, metrics));
                core.stats.metric_samples += 1;
                core.condition_score_sum += condition.score() as u64;
                if core.condition != condition {
                    debug!(
                        mode = %shared.mode,
                        from = %core.condition,
                        to = %condition,
                        "Network condition changed"
                    );
                    core.condition = condition;
                    events.push(Event::ConditionChanged(condition));
                }
            }
            trace!(
                mode = %shared.mode,
                loss_pct = metrics.loss_percent(),
                rtt_ms = metrics.rtt_ms,
                %condition,
                "Metrics sample"
            );
            let mut ctx = StrategyContext::new(shared, now, &mut events);
            if let Err(e) = strategy.on_metrics(&mut ctx, &metrics) {
                warn!(mode = %shared.mode, "Strategy failed to process metrics: {}", e);
                events.push(Event::Error(format!("metrics processing failed: {}", e)));
            }
        }
        shared.dispatch(events);
    }

    fn force_quality_adjustment(
        &self,
        bitrate: u32,
        frame_rate: u32,
        reason: &str,
    ) -> Option<QualityAdjustment> {
        let shared = &self.shared;
        let mut events = Vec::new();
        let adjustment = {
            let mut strategy = shared.strategy.lock();
            let adjustment = shared.apply_adjustment(
                &mut events,
                Instant::now(),
                bitrate,
                frame_rate,
                reason,
                true,
            );
            if let Some(adjustment) = &adjustment {
                strategy.on_forced(adjustment);
            }
            adjustment
        };
        shared.dispatch(events);
        adjustment
    }

    fn set_callback(&self, callback: Arc<dyn ConditionerCallback>) {
        *self.shared.callback.write() = Some(callback);
    }

    fn mode(&self) -> ConditionerMode {
        self.shared.mode
    }

    fn current_network_condition(&self) -> NetworkCondition {
        self.shared.core.lock().condition
    }

    fn is_active(&self) -> bool {
        self.shared.core.lock().is_active()
    }

    fn current_bitrate(&self) -> u32 {
        self.shared.core.lock().bitrate
    }

    fn current_frame_rate(&self) -> u32 {
        self.shared.core.lock().frame_rate
    }

    fn stats(&self) -> ConditionerStats {
        self.shared.core.lock().snapshot_stats(Instant::now())
    }
}

impl Drop for Conditioner {
    fn drop(&mut self) {
        self.abort_monitor();
    }
}
