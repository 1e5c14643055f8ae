use std::collections::BTreeMap;

use rand::{Rng, SeedableRng, rngs::StdRng};
use vigil::{
    bidding::{Bid, ProposedAction, ScorerKind, TERM_COST_MS, TERM_INFO_GAIN, TERM_RISK, TERM_UTILITY},
    budget::{BudgetManager, FixedBudget},
    market::{MarketStrategy, efficiency, pareto_frontier, run_auction},
};

fn bid(id: &str, score: f64, cost_ms: u64) -> Bid {
    bid_with_terms(id, score, cost_ms, BTreeMap::new())
}

fn bid_with_terms(id: &str, score: f64, cost_ms: u64, terms: BTreeMap<String, f64>) -> Bid {
    Bid {
        bid_id: id.to_string(),
        event_id: format!("evt-{id}"),
        source: "feed".to_string(),
        event_type: "alert".to_string(),
        scorer: ScorerKind::Utility,
        score,
        terms,
        estimated_cost_ms: cost_ms,
        action: ProposedAction {
            capability: "search.query".to_string(),
            params: serde_json::json!({}),
        },
    }
}

#[test]
fn given_1000ms_pool_when_two_bids_compete_then_only_the_efficient_one_wins() {
    let mut budget = BudgetManager::new(1_000);
    budget.tick();

    let outcome = run_auction(
        vec![bid("a", 10.0, 600), bid("b", 9.0, 500)],
        &budget,
        "pareto_knee",
    );

    assert!(efficiency(&bid("b", 9.0, 500)) > efficiency(&bid("a", 10.0, 600)));
    assert_eq!(outcome.winners.len(), 1);
    assert_eq!(outcome.winners[0].bid_id, "b");
    assert_eq!(outcome.spent_ms, 500);
    assert_eq!(outcome.budget_ms, 1_000);
    assert!(!outcome.fell_back);
}

#[test]
fn given_random_bids_when_clearing_then_spend_never_exceeds_budget() {
    let mut rng = StdRng::seed_from_u64(1234);
    for round in 0..50 {
        let budget_ms = rng.random_range(0..2_000_i64);
        let bids = (0..rng.random_range(0..30))
            .map(|index| {
                bid(
                    &format!("r{round}-{index}"),
                    rng.random_range(-1.0..10.0),
                    rng.random_range(0..800),
                )
            })
            .collect::<Vec<_>>();

        let outcome = run_auction(bids, &FixedBudget(budget_ms), "pareto_knee");
        let winner_cost: u64 = outcome.winners.iter().map(|bid| bid.estimated_cost_ms).sum();
        assert_eq!(winner_cost, outcome.spent_ms);
        assert!(outcome.spent_ms as i64 <= budget_ms.max(0));
    }
}

#[test]
fn given_negative_score_bid_when_budget_remains_then_it_wins_after_positive_ones() {
    let outcome = run_auction(
        vec![bid("costly", -29.0, 300), bid("cheap", 2.0, 100), bid("dear", -7.0, 80)],
        &FixedBudget(400),
        "pareto_knee",
    );

    let ids = outcome
        .winners
        .iter()
        .map(|bid| bid.bid_id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["cheap", "dear"]);
    assert_eq!(outcome.spent_ms, 180);
}

#[test]
fn given_no_bids_or_no_budget_when_clearing_then_no_winners() {
    let empty = run_auction(Vec::new(), &FixedBudget(1_000), "pareto_knee");
    assert!(empty.winners.is_empty());
    assert_eq!(empty.spent_ms, 0);

    let broke = run_auction(vec![bid("a", 5.0, 10)], &FixedBudget(0), "pareto_knee");
    assert!(broke.winners.is_empty());

    let overdrawn = run_auction(vec![bid("a", 5.0, 10)], &-5_i64, "pareto_knee");
    assert!(overdrawn.winners.is_empty());
}

#[test]
fn given_unknown_strategy_when_clearing_then_fallback_is_recorded() {
    let outcome = run_auction(vec![bid("a", 1.0, 10)], &FixedBudget(100), "sealed_second_price");
    assert_eq!(outcome.strategy_applied, MarketStrategy::ParetoKnee);
    assert!(outcome.fell_back);
    assert_eq!(outcome.strategy_requested, "sealed_second_price");
}

#[test]
fn given_dominated_bid_when_building_frontier_then_it_is_excluded() {
    let terms = |utility: f64, info_gain: f64, risk: f64, cost_ms: f64| {
        BTreeMap::from([
            (TERM_UTILITY.to_string(), utility),
            (TERM_INFO_GAIN.to_string(), info_gain),
            (TERM_RISK.to_string(), risk),
            (TERM_COST_MS.to_string(), cost_ms),
        ])
    };
    let bids = vec![
        bid_with_terms("strong", 1.0, 100, terms(0.9, 0.6, 0.1, 100.0)),
        bid_with_terms("weak", 0.5, 200, terms(0.4, 0.3, 0.2, 200.0)),
        bid_with_terms("cheap", 0.4, 20, terms(0.3, 0.2, 0.1, 20.0)),
    ];

    let frontier = pareto_frontier(&bids);
    let ids = frontier
        .points
        .iter()
        .map(|point| point.bid_id.as_str())
        .collect::<Vec<_>>();

    assert!(ids.contains(&"strong"));
    assert!(ids.contains(&"cheap"));
    assert!(!ids.contains(&"weak"));
    let knee = frontier.knee.expect("non-empty frontier has a knee");
    assert!(ids.contains(&knee.as_str()));
}
