//! Shared helpers for the integration tests

#![allow(dead_code)]

use std::time::Duration;
use streamconditioner::{
    QualityAdjustment, StreamConditioner, MAX_BITRATE, MAX_FRAMERATE, MIN_BITRATE, MIN_FRAMERATE,
};
use tokio::time::{sleep_until, Instant};

pub const BANDWIDTH: f64 = 5_000_000.0;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Wait until `origin + at_ms`, then feed one sample
pub async fn feed_at(
    conditioner: &dyn StreamConditioner,
    origin: Instant,
    at_ms: u64,
    loss: f64,
    rtt_ms: f64,
) {
    sleep_until(origin + Duration::from_millis(at_ms)).await;
    conditioner.update_network_metrics(loss, rtt_ms, BANDWIDTH);
}

pub async fn advance_to(origin: Instant, at_ms: u64) {
    sleep_until(origin + Duration::from_millis(at_ms)).await;
}

pub fn assert_within_bounds(adjustments: &[QualityAdjustment]) {
    for a in adjustments {
        assert!(
            (MIN_BITRATE..=MAX_BITRATE).contains(&a.new_bitrate),
            "bitrate out of bounds: {:?}",
            a
        );
        assert!(
            (MIN_FRAMERATE..=MAX_FRAMERATE).contains(&a.new_frame_rate),
            "frame rate out of bounds: {:?}",
            a
        );
    }
}
