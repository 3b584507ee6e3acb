//! Decision behaviour of each strategy under scripted telemetry
//!
//! All tests run on a paused Tokio clock, so timings are exact.

mod common;

use common::{advance_to, assert_within_bounds, feed_at, init_tracing};
use streamconditioner::strategy::HybridMode;
use streamconditioner::testing::start_for_tests;
use streamconditioner::{Conditioner, ConditionerMode, StrategyState, StreamConditioner};
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_logarithmic_descend_on_critical() {
    init_tracing();
    let (conditioner, streamer, callback) =
        start_for_tests(ConditionerMode::LogarithmicDescend, 2_000_000).unwrap();

    conditioner.update_network_metrics(0.30, 600.0, 1_000_000.0);
    assert_eq!(conditioner.current_bitrate(), 1_400_000);
    assert_eq!(conditioner.current_frame_rate(), 30);
    assert_eq!(streamer.bitrates(), vec![1_400_000]);
    assert!(streamer.frame_rates().is_empty());

    // Second critical sample lands inside the global cooldown
    conditioner.update_network_metrics(0.30, 600.0, 1_000_000.0);
    assert_eq!(conditioner.current_bitrate(), 1_400_000);
    assert_eq!(conditioner.stats().rejected_adjustments, 1);

    let adjustments = callback.adjustments();
    assert_eq!(adjustments.len(), 1);
    assert!(adjustments[0].is_decrease());
    assert!(!adjustments[0].forced);
}

#[tokio::test(start_paused = true)]
async fn test_logarithmic_recovers_after_streak() {
    let (conditioner, _streamer, _callback) =
        start_for_tests(ConditionerMode::LogarithmicDescend, 2_000_000).unwrap();
    let origin = Instant::now();

    conditioner.update_network_metrics(0.30, 600.0, 0.0);
    for second in 1..=4 {
        feed_at(&conditioner, origin, second * 1_000, 0.01, 20.0).await;
    }
    // Streak met since the third sample but the cooldown holds until 5s
    assert_eq!(conditioner.current_bitrate(), 1_400_000);

    feed_at(&conditioner, origin, 5_000, 0.01, 20.0).await;
    assert_eq!(conditioner.current_bitrate(), 1_540_000);

    // Next ascend needs 8s since the last one
    for second in 6..=12 {
        feed_at(&conditioner, origin, second * 1_000, 0.01, 20.0).await;
    }
    assert_eq!(conditioner.current_bitrate(), 1_540_000);
    feed_at(&conditioner, origin, 13_000, 0.01, 20.0).await;
    assert_eq!(conditioner.current_bitrate(), 1_694_000);
}

#[tokio::test(start_paused = true)]
async fn test_logarithmic_frame_rate_follows_deep_descend() {
    let (conditioner, _streamer, callback) =
        start_for_tests(ConditionerMode::LogarithmicDescend, 2_000_000).unwrap();
    let origin = Instant::now();

    let mut observed = Vec::new();
    for step in 0..=8 {
        feed_at(&conditioner, origin, step * 5_000, 0.40, 700.0).await;
        observed.push((conditioner.current_bitrate(), conditioner.current_frame_rate()));
    }

    assert_eq!(
        observed,
        vec![
            (1_400_000, 30),
            (980_000, 30),
            (686_000, 30),
            (480_200, 24),
            (336_140, 19),
            (235_298, 15),
            (164_709, 15),
            (128_000, 15),
            (128_000, 15),
        ]
    );
    assert_within_bounds(&callback.adjustments());
}

#[tokio::test(start_paused = true)]
async fn test_logarithmic_frame_rate_recovers_after_bitrate() {
    let (conditioner, _streamer, callback) =
        start_for_tests(ConditionerMode::LogarithmicDescend, 2_000_000).unwrap();
    let origin = Instant::now();

    for step in 0..=5 {
        feed_at(&conditioner, origin, step * 5_000, 0.40, 700.0).await;
    }
    assert_eq!(conditioner.current_quality(), (235_298, 15));

    // One excellent sample per second: an ascend every 8s from 30s on
    for second in 26..=250 {
        feed_at(&conditioner, origin, second * 1_000, 0.0, 10.0).await;
    }
    assert_eq!(conditioner.current_quality(), (2_000_000, 30));

    let adjustments = callback.adjustments();
    let tail: Vec<_> = adjustments[adjustments.len() - 6..]
        .iter()
        .map(|a| (a.new_bitrate, a.new_frame_rate))
        .collect();
    assert_eq!(
        tail,
        vec![
            (2_000_000, 21),
            (2_000_000, 23),
            (2_000_000, 25),
            (2_000_000, 27),
            (2_000_000, 29),
            (2_000_000, 30),
        ]
    );

    // Nothing left to recover
    let total = adjustments.len();
    for second in 251..=280 {
        feed_at(&conditioner, origin, second * 1_000, 0.0, 10.0).await;
    }
    assert_eq!(callback.adjustments().len(), total);
}

#[tokio::test(start_paused = true)]
async fn test_ladder_drops_one_rung_on_poor() {
    init_tracing();
    let (conditioner, _streamer, callback) =
        start_for_tests(ConditionerMode::LadderAscend, 2_000_000).unwrap();
    assert_eq!(conditioner.ladder_level(), Some(5));

    conditioner.update_network_metrics(0.13, 100.0, 0.0);
    assert_eq!(conditioner.ladder_level(), Some(4));
    assert_eq!(conditioner.current_quality(), (1_800_000, 30));

    // Immediate second Poor sample is inside the 2s descend gap
    conditioner.update_network_metrics(0.13, 100.0, 0.0);
    assert_eq!(conditioner.ladder_level(), Some(4));
    assert_eq!(conditioner.current_bitrate(), 1_800_000);
    assert_eq!(callback.adjustments().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_ladder_climbs_after_stability_hold() {
    let (conditioner, _streamer, _callback) =
        start_for_tests(ConditionerMode::LadderAscend, 2_000_000).unwrap();
    let origin = Instant::now();

    conditioner.update_network_metrics(0.13, 100.0, 0.0);
    assert_eq!(conditioner.ladder_level(), Some(4));

    for second in 1..=15 {
        feed_at(&conditioner, origin, second * 1_000, 0.01, 20.0).await;
    }
    assert_eq!(conditioner.ladder_level(), Some(4), "held only 14s");

    for second in 16..=17 {
        feed_at(&conditioner, origin, second * 1_000, 0.01, 20.0).await;
    }
    assert_eq!(conditioner.ladder_level(), Some(5));
    assert_eq!(conditioner.current_quality(), (2_000_000, 30));
    match conditioner.strategy_state() {
        StrategyState::LadderAscend { stable_tier, .. } => {
            assert_eq!(stable_tier, Some(streamconditioner::NetworkCondition::Excellent))
        }
        other => panic!("unexpected state {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_ladder_critical_drops_three_rungs() {
    let (conditioner, _streamer, _callback) =
        start_for_tests(ConditionerMode::LadderAscend, 2_000_000).unwrap();

    conditioner.update_network_metrics(0.05, 650.0, 0.0);
    assert_eq!(conditioner.ladder_level(), Some(2));
    assert_eq!(conditioner.current_quality(), (1_200_000, 24));
}

#[tokio::test(start_paused = true)]
async fn test_hybrid_learns_conservative() {
    init_tracing();
    let (conditioner, _streamer, callback) =
        start_for_tests(ConditionerMode::Hybrid, 2_000_000).unwrap();
    let origin = Instant::now();
    assert_eq!(conditioner.hybrid_mode(), Some(HybridMode::Learning));

    // 29 stable samples and 2 unstable (RTT) ones: ~94% stable, no critical
    for second in 0..=29 {
        let rtt = if second % 15 == 7 { 210.0 } else { 30.0 };
        feed_at(&conditioner, origin, second * 1_000, 0.01, rtt).await;
    }
    advance_to(origin, 29_500).await;
    assert_eq!(conditioner.hybrid_mode(), Some(HybridMode::Learning));

    advance_to(origin, 31_000).await;
    assert_eq!(conditioner.hybrid_mode(), Some(HybridMode::Conservative));
    assert!(callback.adjustments().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_hybrid_learns_aggressive_on_critical_network() {
    let (conditioner, _streamer, callback) =
        start_for_tests(ConditionerMode::Hybrid, 2_000_000).unwrap();
    let origin = Instant::now();

    for second in 0..=30 {
        feed_at(&conditioner, origin, second * 1_000, 0.30, 500.0).await;
    }
    advance_to(origin, 31_000).await;
    assert_eq!(conditioner.hybrid_mode(), Some(HybridMode::Aggressive));
    assert!(conditioner.current_bitrate() < 2_000_000);
    assert_within_bounds(&callback.adjustments());
}

#[tokio::test(start_paused = true)]
async fn test_hybrid_learns_balanced_on_mixed_network() {
    let (conditioner, _streamer, _callback) =
        start_for_tests(ConditionerMode::Hybrid, 2_000_000).unwrap();
    let origin = Instant::now();

    // Per 10 samples: 6 stable, 3 unstable, 1 critical
    for second in 0..30 {
        let (loss, rtt) = match second % 10 {
            0..=5 => (0.01, 30.0),
            6..=8 => (0.01, 210.0),
            _ => (0.30, 450.0),
        };
        feed_at(&conditioner, origin, second * 1_000, loss, rtt).await;
    }
    advance_to(origin, 31_000).await;
    assert_eq!(conditioner.hybrid_mode(), Some(HybridMode::Balanced));
}

/// From 31s: one descending sample, then a stable sample every second.
/// The ascend must land exactly `ascend_delay_ms` after the descend.
async fn assert_sub_mode_steps(
    conditioner: &Conditioner,
    origin: Instant,
    trigger: (f64, f64),
    descended: u32,
    ascend_delay_ms: u64,
    ascended: u32,
) {
    feed_at(conditioner, origin, 31_000, trigger.0, trigger.1).await;
    assert_eq!(conditioner.current_bitrate(), descended);

    let ascend_at = 31_000 + ascend_delay_ms;
    let mut at = 32_000;
    while at < ascend_at {
        feed_at(conditioner, origin, at, 0.01, 30.0).await;
        at += 1_000;
    }
    assert_eq!(conditioner.current_bitrate(), descended, "ascended before the delay");

    feed_at(conditioner, origin, ascend_at, 0.01, 30.0).await;
    assert_eq!(conditioner.current_bitrate(), ascended);
    assert_eq!(conditioner.current_frame_rate(), 30);
}

#[tokio::test(start_paused = true)]
async fn test_hybrid_conservative_steps() {
    let (conditioner, _streamer, _callback) =
        start_for_tests(ConditionerMode::Hybrid, 2_000_000).unwrap();
    let origin = Instant::now();

    for second in 0..30 {
        feed_at(&conditioner, origin, second * 1_000, 0.01, 30.0).await;
    }
    advance_to(origin, 30_500).await;
    assert_eq!(conditioner.hybrid_mode(), Some(HybridMode::Conservative));

    // x0.80 on a critical sample, x1.12 after 8s
    assert_sub_mode_steps(&conditioner, origin, (0.30, 500.0), 1_600_000, 8_000, 1_792_000).await;
}

#[tokio::test(start_paused = true)]
async fn test_hybrid_aggressive_steps() {
    let (conditioner, _streamer, callback) =
        start_for_tests(ConditionerMode::Hybrid, 2_000_000).unwrap();
    let origin = Instant::now();

    // Unstable on RTT alone, below the learning descend thresholds
    for second in 0..30 {
        feed_at(&conditioner, origin, second * 1_000, 0.01, 210.0).await;
    }
    advance_to(origin, 30_500).await;
    assert_eq!(conditioner.hybrid_mode(), Some(HybridMode::Aggressive));
    assert!(callback.adjustments().is_empty());

    // 210ms is enough to descend x0.65 here; ascend x1.05 after 12s
    assert_sub_mode_steps(&conditioner, origin, (0.01, 210.0), 1_300_000, 12_000, 1_365_000).await;
}

#[tokio::test(start_paused = true)]
async fn test_hybrid_balanced_steps() {
    let (conditioner, _streamer, callback) =
        start_for_tests(ConditionerMode::Hybrid, 2_000_000).unwrap();
    let origin = Instant::now();

    // 60% stable, 40% unstable, nothing critical
    for second in 0..30 {
        let rtt = if second % 10 < 6 { 30.0 } else { 210.0 };
        feed_at(&conditioner, origin, second * 1_000, 0.01, rtt).await;
    }
    advance_to(origin, 30_500).await;
    assert_eq!(conditioner.hybrid_mode(), Some(HybridMode::Balanced));
    assert!(callback.adjustments().is_empty());

    // 15% loss crosses the 14.4% threshold: x0.75, then x1.08 after 6s
    assert_sub_mode_steps(&conditioner, origin, (0.15, 50.0), 1_500_000, 6_000, 1_620_000).await;
}

#[tokio::test(start_paused = true)]
async fn test_hybrid_failed_ascends_switch_to_aggressive() {
    let (conditioner, _streamer, _callback) =
        start_for_tests(ConditionerMode::Hybrid, 2_000_000).unwrap();
    let origin = Instant::now();

    for second in 0..30 {
        feed_at(&conditioner, origin, second * 1_000, 0.01, 30.0).await;
    }
    advance_to(origin, 30_500).await;
    assert_eq!(conditioner.hybrid_mode(), Some(HybridMode::Conservative));

    // Every 20s: a lossy sample forces a descend, the recovery ascend is
    // immediately followed by loss again
    let mut bad_at = 31_000;
    for _ in 0..5 {
        feed_at(&conditioner, origin, bad_at, 0.22, 50.0).await;
        feed_at(&conditioner, origin, bad_at + 10_000, 0.01, 30.0).await;
        bad_at += 20_000;
    }
    assert_eq!(conditioner.hybrid_mode(), Some(HybridMode::Conservative));
    match conditioner.strategy_state() {
        StrategyState::Hybrid {
            ascend_failures, ..
        } => assert_eq!(ascend_failures, 4),
        other => panic!("unexpected state {:?}", other),
    }

    // Fifth failure
    feed_at(&conditioner, origin, bad_at, 0.22, 50.0).await;
    assert_eq!(conditioner.hybrid_mode(), Some(HybridMode::Aggressive));
    match conditioner.strategy_state() {
        StrategyState::Hybrid { mode_switches, .. } => assert_eq!(mode_switches, 2),
        other => panic!("unexpected state {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_hybrid_never_touches_frame_rate() {
    let (conditioner, streamer, _callback) =
        start_for_tests(ConditionerMode::Hybrid, 4_000_000).unwrap();
    let origin = Instant::now();

    for second in 0..60 {
        let (loss, rtt) = if second % 4 == 0 { (0.35, 500.0) } else { (0.0, 20.0) };
        feed_at(&conditioner, origin, second * 1_000, loss, rtt).await;
    }
    assert!(!streamer.bitrates().is_empty());
    assert!(streamer.frame_rates().is_empty());
    assert_eq!(conditioner.current_frame_rate(), 30);
}

#[tokio::test(start_paused = true)]
async fn test_constant_holds_quality() {
    let (conditioner, streamer, callback) =
        start_for_tests(ConditionerMode::Constant, 3_000_000).unwrap();
    let origin = Instant::now();

    let samples = [(0.0, 10.0), (0.5, 900.0), (0.09, 120.0), (1.0, 5_000.0), (0.02, 40.0)];
    for (i, (loss, rtt)) in samples.iter().cycle().take(40).enumerate() {
        feed_at(&conditioner, origin, i as u64 * 700, *loss, *rtt).await;
        assert_eq!(conditioner.current_quality(), (3_000_000, 30));
    }
    assert!(streamer.bitrates().is_empty());
    assert!(callback.adjustments().is_empty());
    assert_eq!(conditioner.stats().total_adjustments, 0);
}

#[tokio::test(start_paused = true)]
async fn test_constant_escalates_persistent_critical_once() {
    let (conditioner, _streamer, callback) =
        start_for_tests(ConditionerMode::Constant, 3_000_000).unwrap();
    let origin = Instant::now();

    conditioner.update_network_metrics(0.6, 800.0, 0.0);
    advance_to(origin, 5_000).await;
    let errors = callback.errors();
    assert_eq!(errors.len(), 1, "{:?}", errors);
    assert!(errors[0].contains("critical"));

    advance_to(origin, 9_000).await;
    assert_eq!(callback.errors().len(), 1);

    // A new episode after recovery escalates again
    feed_at(&conditioner, origin, 9_500, 0.0, 10.0).await;
    feed_at(&conditioner, origin, 10_000, 0.6, 800.0).await;
    advance_to(origin, 15_000).await;
    assert_eq!(callback.errors().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_constant_short_critical_blip_is_not_escalated() {
    let (conditioner, _streamer, callback) =
        start_for_tests(ConditionerMode::Constant, 3_000_000).unwrap();
    let origin = Instant::now();

    feed_at(&conditioner, origin, 2_500, 0.6, 800.0).await;
    feed_at(&conditioner, origin, 3_000, 0.0, 10.0).await;
    advance_to(origin, 10_000).await;
    assert!(callback.errors().is_empty());
}
