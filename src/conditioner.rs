//! The conditioner contract and its external collaborators

use std::sync::Arc;

use crate::error::Result;
use crate::types::{
    ConditionerMode, ConditionerStats, NetworkCondition, QualityAdjustment,
};

/// Handle to the external encoder/transport
///
/// Implementations should return quickly; the engine calls them from the
/// metrics caller's thread or the monitoring task.
pub trait Streamer: Send + Sync {
    /// Apply a new target bitrate in bits per second
    fn set_bitrate(&self, bitrate_bps: u32) -> anyhow::Result<()>;

    /// Advisory frame rate change. The encoder may need a restart to honour it,
    /// which is outside the conditioner's concern.
    fn set_frame_rate(&self, _frame_rate: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Connection identifiers handed to `start`, passed through untouched
    fn bind_connections(&self, _connection_ids: &[String]) {}
}

/// Listener for conditioner events
///
/// Invoked on whichever thread triggered the event, never while the engine
/// holds its locks.
pub trait ConditionerCallback: Send + Sync {
    fn on_quality_adjusted(&self, _adjustment: &QualityAdjustment) {}

    fn on_network_condition_changed(&self, _condition: NetworkCondition) {}

    fn on_conditioner_error(&self, _message: &str) {}
}

/// Operations every conditioner exposes to the session orchestrator
pub trait StreamConditioner: Send + Sync {
    /// Begin adaptation. A no-op (with a warning) unless the instance is idle.
    fn start(
        &self,
        streamer: Arc<dyn Streamer>,
        initial_bitrate: u32,
        connection_ids: Vec<String>,
    ) -> Result<()>;

    /// End adaptation. Idempotent.
    fn stop(&self);

    /// Feed one telemetry sample
    fn update_network_metrics(&self, packet_loss: f64, rtt_ms: f64, bandwidth_bps: f64);

    /// Apply the given quality regardless of strategy decisions and cooldown
    fn force_quality_adjustment(
        &self,
        bitrate: u32,
        frame_rate: u32,
        reason: &str,
    ) -> Option<QualityAdjustment>;

    /// Register the sole listener; replaces any previous one
    fn set_callback(&self, callback: Arc<dyn ConditionerCallback>);

    fn mode(&self) -> ConditionerMode;

    fn current_network_condition(&self) -> NetworkCondition;

    fn is_active(&self) -> bool;

    fn current_bitrate(&self) -> u32;

    fn current_frame_rate(&self) -> u32;

    fn stats(&self) -> ConditionerStats;
}
