//! Command implementations for the conditioner simulator

use anyhow::{Context, Result};
use serde_json::json;
use std::path::Path;
use streamconditioner::testing::{RecordingCallback, RecordingStreamer};
use streamconditioner::{
    ConditionerConfig, ConditionerFactory, ConditionerMode, Scenario, StreamConditioner,
};
use tracing::{error, info};

pub struct RunArgs {
    pub scenario: String,
    pub mode: String,
    pub initial_bitrate: u32,
    pub config: Option<String>,
}

/// Implementation of the 'run' command
pub async fn cmd_run(args: RunArgs) -> Result<()> {
    let scenario = resolve_scenario(&args.scenario)?;
    let mode: ConditionerMode = args.mode.parse()?;
    let config = match &args.config {
        Some(path) => ConditionerConfig::from_json_file(path)
            .with_context(|| format!("failed to load config from {}", path))?,
        None => ConditionerConfig::default(),
    };

    info!(
        "Running scenario '{}' through {} at {} bps",
        scenario.name, mode, args.initial_bitrate
    );

    let conditioner = ConditionerFactory::try_create_with_config(mode, config)?;
    let streamer = RecordingStreamer::new();
    let callback = RecordingCallback::new();
    conditioner.set_callback(callback.clone());
    conditioner.start(streamer.clone(), args.initial_bitrate, vec!["sim-0".to_string()])?;

    let fed = scenario.play(&conditioner).await;
    conditioner.stop();

    let report = json!({
        "scenario": scenario.name,
        "mode": mode.name(),
        "samples": fed,
        "initial_bitrate": args.initial_bitrate,
        "final_bitrate": conditioner.current_bitrate(),
        "final_frame_rate": conditioner.current_frame_rate(),
        "adjustments": callback.adjustments(),
        "errors": callback.errors(),
        "strategy": conditioner.strategy_state(),
        "stats": conditioner.stats(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Implementation of the 'list' command
pub fn cmd_list() -> Result<()> {
    println!("Available scenario presets:");
    println!("===========================");
    for scenario in Scenario::all_presets() {
        println!(
            "  {:<12} {:>4}s - {}",
            scenario.name,
            scenario.duration().as_secs(),
            scenario.description
        );
    }
    Ok(())
}

/// Implementation of the 'modes' command
pub fn cmd_modes() -> Result<()> {
    println!("Supported conditioner modes:");
    println!("============================");
    for info in ConditionerFactory::mode_info() {
        println!("  {}  {:<20} - {}", info.code, info.name, info.description);
    }
    Ok(())
}

/// Preset name, or a path to a scenario JSON file
fn resolve_scenario(scenario: &str) -> Result<Scenario> {
    if let Some(preset) = Scenario::preset(scenario) {
        return Ok(preset);
    }
    if Path::new(scenario).is_file() {
        return Scenario::from_json_file(scenario)
            .with_context(|| format!("failed to load scenario from {}", scenario));
    }
    error!("Unknown scenario: {}", scenario);
    anyhow::bail!(
        "Scenario '{}' is neither a preset ({}) nor a file",
        scenario,
        Scenario::preset_names().join(", ")
    );
}
