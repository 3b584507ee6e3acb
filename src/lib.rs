//! Adaptive bitrate and frame-rate control for live video uplinks
//!
//! A [`Conditioner`] takes periodic network telemetry (packet loss, RTT,
//! bandwidth), classifies it into a [`NetworkCondition`] and lets one of four
//! strategies decide when to lower or raise the encoder's bitrate and frame
//! rate. Changes are pushed to an external [`Streamer`] and reported through a
//! [`ConditionerCallback`].
//!
//! ```no_run
//! use streamconditioner::{ConditionerFactory, ConditionerMode, StreamConditioner};
//! use streamconditioner::testing::RecordingStreamer;
//!
//! # async fn demo() -> streamconditioner::Result<()> {
//! let conditioner = ConditionerFactory::create(ConditionerMode::LogarithmicDescend);
//! conditioner.start(RecordingStreamer::new(), 2_000_000, vec!["uplink-0".into()])?;
//! conditioner.update_network_metrics(0.30, 600.0, 1_000_000.0);
//! assert_eq!(conditioner.current_bitrate(), 1_400_000);
//! conditioner.stop();
//! # Ok(())
//! # }
//! ```

pub mod conditioner;
pub mod config;
pub mod engine;
pub mod error;
pub mod factory;
#[cfg(feature = "gst")]
pub mod gst_streamer;
pub mod scenario;
pub mod strategy;
pub mod testing;
pub mod types;

pub use crate::conditioner::{ConditionerCallback, StreamConditioner, Streamer};
pub use crate::config::{ConditionThresholds, ConditionerConfig, TierBound};
pub use crate::engine::Conditioner;
pub use crate::error::{ConditionerError, ConfigError, Result};
pub use crate::factory::{ConditionerFactory, ModeInfo};
#[cfg(feature = "gst")]
pub use crate::gst_streamer::GstEncoderStreamer;
pub use crate::scenario::{Scenario, TelemetrySample};
pub use crate::strategy::{HybridMode, Strategy, StrategyState};
pub use crate::types::{
    ConditionerMode, ConditionerState, ConditionerStats, NetworkCondition, NetworkMetrics,
    QualityAdjustment, DEFAULT_FRAMERATE, MAX_BITRATE, MAX_FRAMERATE, MIN_BITRATE, MIN_FRAMERATE,
};
