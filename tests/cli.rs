//! Tests for the conditioner-sim binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn cli_command() -> Command {
    Command::cargo_bin("conditioner-sim").expect("Failed to find conditioner-sim binary")
}

#[test]
fn test_cli_list_command() {
    let mut cmd = cli_command();
    cmd.arg("list");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Available scenario presets:"))
        .stdout(predicate::str::contains("stable"))
        .stdout(predicate::str::contains("degrading"))
        .stdout(predicate::str::contains("recovering"));
}

#[test]
fn test_cli_modes_command() {
    let mut cmd = cli_command();
    cmd.args(["--verbose", "modes"]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("logarithmic-descend"))
        .stdout(predicate::str::contains("ladder-ascend"))
        .stdout(predicate::str::contains("hybrid"))
        .stdout(predicate::str::contains("constant"));
}

#[test]
fn test_cli_run_unknown_scenario_fails() {
    let mut cmd = cli_command();
    cmd.args(["run", "nonexistent_scenario"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("neither a preset"));
}

#[test]
fn test_cli_run_unknown_mode_fails() {
    let mut cmd = cli_command();
    cmd.args(["run", "stable", "--mode", "turbo"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unknown conditioner mode"));
}

#[test]
fn test_cli_run_scenario_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "name": "short-outage",
            "samples": [
                {{ "at_ms": 0, "packet_loss": 0.30, "rtt_ms": 600 }},
                {{ "at_ms": 200, "packet_loss": 0.0, "rtt_ms": 20 }}
            ]
        }}"#
    )
    .unwrap();

    let mut cmd = cli_command();
    cmd.args(["run", file.path().to_str().unwrap(), "--mode", "0"]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"scenario\": \"short-outage\""))
        .stdout(predicate::str::contains("\"final_bitrate\": 1400000"))
        .stdout(predicate::str::contains("\"total_adjustments\": 1"));
}
