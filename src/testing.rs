//! In-memory collaborators for tests and the simulator

use anyhow::bail;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

use crate::conditioner::{ConditionerCallback, StreamConditioner, Streamer};
use crate::config::ConditionerConfig;
use crate::engine::Conditioner;
use crate::error::Result;
use crate::factory::ConditionerFactory;
use crate::types::{ConditionerMode, NetworkCondition, QualityAdjustment};

/// Streamer that records every value pushed to it
#[derive(Debug, Default)]
pub struct RecordingStreamer {
    bitrates: Mutex<Vec<u32>>,
    frame_rates: Mutex<Vec<u32>>,
    connections: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl RecordingStreamer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// While failing, pushes are rejected and not recorded
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn bitrates(&self) -> Vec<u32> {
        self.bitrates.lock().clone()
    }

    pub fn frame_rates(&self) -> Vec<u32> {
        self.frame_rates.lock().clone()
    }

    pub fn connections(&self) -> Vec<String> {
        self.connections.lock().clone()
    }

    pub fn last_bitrate(&self) -> Option<u32> {
        self.bitrates.lock().last().copied()
    }
}

impl Streamer for RecordingStreamer {
    fn set_bitrate(&self, bitrate_bps: u32) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("encoder rejected bitrate {}", bitrate_bps);
        }
        self.bitrates.lock().push(bitrate_bps);
        Ok(())
    }

    fn set_frame_rate(&self, frame_rate: u32) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("encoder rejected frame rate {}", frame_rate);
        }
        self.frame_rates.lock().push(frame_rate);
        Ok(())
    }

    fn bind_connections(&self, connection_ids: &[String]) {
        self.connections.lock().extend_from_slice(connection_ids);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallbackEvent {
    Adjusted(QualityAdjustment),
    ConditionChanged(NetworkCondition),
    Error(String),
}

/// Callback that keeps every event with the (Tokio) time it arrived
#[derive(Debug, Default)]
pub struct RecordingCallback {
    events: Mutex<Vec<(Instant, CallbackEvent)>>,
}

impl RecordingCallback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<(Instant, CallbackEvent)> {
        self.events.lock().clone()
    }

    pub fn adjustments(&self) -> Vec<QualityAdjustment> {
        self.events
            .lock()
            .iter()
            .filter_map(|(_, e)| match e {
                CallbackEvent::Adjusted(a) => Some(a.clone()),
                _ => None,
            })
            .collect()
    }

    /// Adjustments with the time each was reported
    pub fn timed_adjustments(&self) -> Vec<(Instant, QualityAdjustment)> {
        self.events
            .lock()
            .iter()
            .filter_map(|(at, e)| match e {
                CallbackEvent::Adjusted(a) => Some((*at, a.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn conditions(&self) -> Vec<NetworkCondition> {
        self.events
            .lock()
            .iter()
            .filter_map(|(_, e)| match e {
                CallbackEvent::ConditionChanged(c) => Some(*c),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|(_, e)| match e {
                CallbackEvent::Error(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn push(&self, event: CallbackEvent) {
        self.events.lock().push((Instant::now(), event));
    }
}

impl ConditionerCallback for RecordingCallback {
    fn on_quality_adjusted(&self, adjustment: &QualityAdjustment) {
        self.push(CallbackEvent::Adjusted(adjustment.clone()));
    }

    fn on_network_condition_changed(&self, condition: NetworkCondition) {
        self.push(CallbackEvent::ConditionChanged(condition));
    }

    fn on_conditioner_error(&self, message: &str) {
        self.push(CallbackEvent::Error(message.to_string()));
    }
}

/// A started conditioner wired to fresh recorders. Needs a Tokio runtime.
pub fn start_for_tests(
    mode: ConditionerMode,
    initial_bitrate: u32,
) -> Result<(Conditioner, Arc<RecordingStreamer>, Arc<RecordingCallback>)> {
    let conditioner = ConditionerFactory::create_with_config(mode, ConditionerConfig::default());
    let streamer = RecordingStreamer::new();
    let callback = RecordingCallback::new();
    conditioner.set_callback(callback.clone());
    conditioner.start(streamer.clone(), initial_bitrate, vec!["test-conn".to_string()])?;
    Ok((conditioner, streamer, callback))
}
