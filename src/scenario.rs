//! Scripted telemetry for driving a conditioner
//!
//! A [`Scenario`] is a time-ordered list of samples. Built-in presets cover the
//! usual shapes of a mobile uplink; custom scenarios can be loaded from JSON
//! or assembled with the fluent methods.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use crate::conditioner::StreamConditioner;
use crate::error::ConfigError;

const SAMPLE_PERIOD_MS: u64 = 1_000;
const DEFAULT_BANDWIDTH_BPS: f64 = 10_000_000.0;

/// One telemetry sample, offset from the start of playback
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub at_ms: u64,
    pub packet_loss: f64,
    pub rtt_ms: f64,
    #[serde(default = "default_bandwidth")]
    pub bandwidth_bps: f64,
}

fn default_bandwidth() -> f64 {
    DEFAULT_BANDWIDTH_BPS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub samples: Vec<TelemetrySample>,
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            samples: Vec::new(),
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn sample(mut self, at_ms: u64, packet_loss: f64, rtt_ms: f64) -> Self {
        self.samples.push(TelemetrySample {
            at_ms,
            packet_loss,
            rtt_ms,
            bandwidth_bps: DEFAULT_BANDWIDTH_BPS,
        });
        self
    }

    /// Constant conditions, one sample per second over `[from_ms, to_ms)`
    pub fn steady(mut self, from_ms: u64, to_ms: u64, packet_loss: f64, rtt_ms: f64) -> Self {
        let mut at = from_ms;
        while at < to_ms {
            self = self.sample(at, packet_loss, rtt_ms);
            at += SAMPLE_PERIOD_MS;
        }
        self
    }

    /// Linear drift between two conditions, one sample per second
    pub fn ramp(
        mut self,
        from_ms: u64,
        to_ms: u64,
        (loss_from, rtt_from): (f64, f64),
        (loss_to, rtt_to): (f64, f64),
    ) -> Self {
        let span = to_ms.saturating_sub(from_ms).max(1) as f64;
        let mut at = from_ms;
        while at < to_ms {
            let t = (at - from_ms) as f64 / span;
            self = self.sample(
                at,
                loss_from + (loss_to - loss_from) * t,
                rtt_from + (rtt_to - rtt_from) * t,
            );
            at += SAMPLE_PERIOD_MS;
        }
        self
    }

    /// Offset of the last sample
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.samples.iter().map(|s| s.at_ms).max().unwrap_or(0))
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let mut scenario: Scenario = serde_json::from_str(json)?;
        scenario.samples.sort_by_key(|s| s.at_ms);
        Ok(scenario)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Feed every sample at its offset from now. Returns the number fed.
    pub async fn play(&self, conditioner: &dyn StreamConditioner) -> usize {
        info!(
            scenario = %self.name,
            samples = self.samples.len(),
            duration_ms = self.duration().as_millis() as u64,
            "Playing scenario"
        );
        let origin = Instant::now();
        let mut fed = 0;
        for sample in &self.samples {
            sleep_until(origin + Duration::from_millis(sample.at_ms)).await;
            if !conditioner.is_active() {
                debug!(
                    scenario = %self.name,
                    fed,
                    "Conditioner no longer active, stopping playback"
                );
                break;
            }
            conditioner.update_network_metrics(
                sample.packet_loss,
                sample.rtt_ms,
                sample.bandwidth_bps,
            );
            fed += 1;
        }
        fed
    }

    /// Built-in preset by name
    pub fn preset(name: &str) -> Option<Self> {
        let scenario = match name {
            "stable" => Self::new("stable")
                .description("Clean network for a minute")
                .steady(0, 60_000, 0.005, 30.0),
            "degrading" => Self::new("degrading")
                .description("Loss and latency rise steadily until the link is critical")
                .ramp(0, 60_000, (0.0, 30.0), (0.35, 450.0)),
            "flapping" => {
                let mut s = Self::new("flapping")
                    .description("Alternates 5s of clean network with 5s of heavy loss");
                for cycle in 0..6 {
                    let base = cycle * 10_000;
                    s = s
                        .steady(base, base + 5_000, 0.01, 35.0)
                        .steady(base + 5_000, base + 10_000, 0.20, 350.0);
                }
                s
            }
            "congested" => Self::new("congested")
                .description("Persistent congestion with high loss and queueing delay")
                .steady(0, 60_000, 0.18, 280.0),
            "recovering" => Self::new("recovering")
                .description("A critical outage followed by a clean recovery")
                .steady(0, 10_000, 0.30, 600.0)
                .steady(10_000, 90_000, 0.005, 25.0),
            _ => return None,
        };
        Some(scenario)
    }

    pub fn preset_names() -> &'static [&'static str] {
        &["stable", "degrading", "flapping", "congested", "recovering"]
    }

    pub fn all_presets() -> Vec<Self> {
        Self::preset_names()
            .iter()
            .filter_map(|name| Self::preset(name))
            .collect()
    }
}
