use std::collections::BTreeMap;

use serde_json::json;
use vigil::{
    calibration::{AlphaPolicy, ConformalCalibrator, NEUTRAL_P_VALUE},
    salience::{
        GateContext, NOVELTY_HEAD, PriorSnapshot, RELEVANCE_HEAD, RISK_HEAD, SalienceEngine,
        URGENCY_HEAD, temperature_from_curiosity,
    },
    types::{Event, canonicalize},
};

fn event(id: &str, payload: serde_json::Value) -> Event {
    Event {
        id: id.to_string(),
        source: "inbox".to_string(),
        event_type: "message".to_string(),
        payload,
        observed_at_ms: 0,
    }
}

#[test]
fn given_any_context_when_gating_then_weights_form_a_distribution() {
    let engine = SalienceEngine::with_default_heads(0x5eed);
    for (batch_size, avg_text_len) in [(0, 0.0), (1, 12.0), (64, 4_000.0)] {
        let context = GateContext {
            batch_size,
            avg_text_len,
        };
        for temperature in [0.5, 1.0, 2.0] {
            let weights = engine
                .gate_weights(&context, temperature)
                .expect("finite context should gate");
            assert_eq!(weights.len(), engine.head_names().len());
            let total: f64 = weights.iter().sum();
            assert!((total - 1.0).abs() < 1e-9, "weights sum to {total}");
            assert!(weights.iter().all(|weight| *weight >= 0.0));
        }
    }
}

#[test]
fn given_same_seed_when_gating_then_weights_are_reproducible() {
    let context = GateContext {
        batch_size: 3,
        avg_text_len: 80.0,
    };
    let first = SalienceEngine::with_default_heads(11)
        .gate_weights(&context, 1.0)
        .unwrap();
    let second = SalienceEngine::with_default_heads(11)
        .gate_weights(&context, 1.0)
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn curiosity_maps_linearly_onto_temperature_range() {
    assert_eq!(temperature_from_curiosity(0.0, 0.5, 2.0), 0.5);
    assert_eq!(temperature_from_curiosity(1.0, 0.5, 2.0), 2.0);
    assert!((temperature_from_curiosity(0.5, 0.5, 2.0) - 1.25).abs() < 1e-12);
    assert_eq!(temperature_from_curiosity(7.0, 0.5, 2.0), 2.0);
}

#[tokio::test]
async fn given_secret_in_payload_when_scoring_then_risk_head_flags_it() {
    let engine = SalienceEngine::with_default_heads(1);
    let canonical = canonicalize(&event(
        "e1",
        json!({ "body": "rotate api_key=abc123 before friday" }),
    ));
    let weights = vec![0.25; 4];

    let report = engine
        .score_event(&canonical, &PriorSnapshot::default(), &weights)
        .await
        .expect("matching weight shape should score");

    for head in [RELEVANCE_HEAD, RISK_HEAD, NOVELTY_HEAD, URGENCY_HEAD] {
        let score = report.score(head).expect("every default head scores");
        assert!((0.0..=1.0).contains(&score.raw), "{head} raw {}", score.raw);
    }
    assert_eq!(report.risk_details().get("secret_token"), Some(&json!(true)));
    assert!(report.score(RISK_HEAD).unwrap().raw >= 0.79);
}

#[tokio::test]
async fn given_wrong_weight_count_when_scoring_then_error_is_returned() {
    let engine = SalienceEngine::with_default_heads(1);
    let canonical = canonicalize(&event("e1", json!({ "body": "hello" })));

    let result = engine
        .score_event(&canonical, &PriorSnapshot::default(), &[1.0])
        .await;
    assert!(result.is_err());
}

#[test]
fn given_empty_history_when_computing_p_value_then_neutral_half_is_returned() {
    let calibrator = ConformalCalibrator::new(16);
    assert_eq!(calibrator.p_value(RISK_HEAD, 0.9), NEUTRAL_P_VALUE);
    assert_eq!(NEUTRAL_P_VALUE, 0.5);

    let verdict = calibrator.assess(
        &BTreeMap::from([(RISK_HEAD.to_string(), 0.9)]),
        &AlphaPolicy::default(),
    );
    assert!(!verdict.out_of_distribution);
    assert_eq!(verdict.min_p, 0.5);
}

#[test]
fn given_fixed_history_when_score_rises_then_p_value_never_increases() {
    let mut calibrator = ConformalCalibrator::new(64);
    for step in 0..50 {
        calibrator.update(RELEVANCE_HEAD, f64::from(step) / 50.0);
    }

    let mut previous = f64::INFINITY;
    for step in 0..=120 {
        let score = f64::from(step) / 100.0;
        let p = calibrator.p_value(RELEVANCE_HEAD, score);
        assert!(p <= previous, "p({score}) = {p} rose above {previous}");
        assert!(p > 0.0 && p <= 1.0);
        previous = p;
    }
}

#[test]
fn given_score_above_long_history_when_assessing_then_event_is_out_of_distribution() {
    let mut calibrator = ConformalCalibrator::new(512);
    for _ in 0..100 {
        calibrator.update(URGENCY_HEAD, 0.1);
    }
    let scores = BTreeMap::from([(URGENCY_HEAD.to_string(), 0.95)]);

    let verdict = calibrator.assess(&scores, &AlphaPolicy::default());
    assert!(verdict.out_of_distribution);
    assert_eq!(verdict.triggering_heads, vec![URGENCY_HEAD.to_string()]);
    assert!(verdict.min_p < verdict.alpha);

    let relaxed = AlphaPolicy {
        per_head: BTreeMap::from([(URGENCY_HEAD.to_string(), 1e-9)]),
        ..AlphaPolicy::default()
    };
    assert!(!calibrator.assess(&scores, &relaxed).out_of_distribution);
}
