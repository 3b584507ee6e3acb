//! Built-in scenarios played through each mode

mod common;

use common::{assert_within_bounds, init_tracing};
use streamconditioner::testing::start_for_tests;
use streamconditioner::{ConditionerMode, Scenario, StreamConditioner};

#[tokio::test(start_paused = true)]
async fn test_presets_keep_every_mode_in_bounds() {
    init_tracing();
    for scenario in Scenario::all_presets() {
        for mode in ConditionerMode::ALL {
            let (conditioner, _streamer, callback) = start_for_tests(mode, 2_500_000).unwrap();
            let fed = scenario.play(&conditioner).await;
            assert_eq!(fed, scenario.samples.len(), "{} / {}", scenario.name, mode);
            assert_within_bounds(&callback.adjustments());
            assert_eq!(conditioner.stats().metric_samples, fed as u64);
            conditioner.stop();
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_recovering_preset_descends_then_climbs_back() {
    let scenario = Scenario::preset("recovering").unwrap();
    let (conditioner, _streamer, callback) =
        start_for_tests(ConditionerMode::LogarithmicDescend, 2_000_000).unwrap();
    scenario.play(&conditioner).await;

    let adjustments = callback.adjustments();
    let first_increase = adjustments
        .iter()
        .position(|a| a.is_increase())
        .expect("conditioner should recover");
    assert!(adjustments[..first_increase].iter().all(|a| a.is_decrease()));
    assert!(first_increase >= 2);
    assert_eq!(conditioner.current_bitrate(), 2_000_000);
}

#[tokio::test(start_paused = true)]
async fn test_stable_preset_never_adjusts() {
    let scenario = Scenario::preset("stable").unwrap();
    for mode in ConditionerMode::ALL {
        let (conditioner, streamer, _callback) = start_for_tests(mode, 2_000_000).unwrap();
        scenario.play(&conditioner).await;
        assert!(streamer.bitrates().is_empty(), "{} adjusted on a clean network", mode);
        assert_eq!(conditioner.current_bitrate(), 2_000_000);
    }
}

#[tokio::test(start_paused = true)]
async fn test_playback_stops_with_conditioner() {
    let scenario = Scenario::preset("congested").unwrap();
    let (conditioner, _streamer, _callback) =
        start_for_tests(ConditionerMode::Constant, 2_000_000).unwrap();
    let conditioner = std::sync::Arc::new(conditioner);

    let stopper = conditioner.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(10_500)).await;
        stopper.stop();
    });
    let fed = scenario.play(conditioner.as_ref()).await;
    assert_eq!(fed, 11);
}
