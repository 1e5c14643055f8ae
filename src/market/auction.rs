use serde::{Deserialize, Serialize};

use crate::{
    bidding::Bid,
    budget::AvailableMs,
    market::pareto::{ParetoFrontier, pareto_frontier},
};

pub const EFFICIENCY_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MarketStrategy {
    #[default]
    ParetoKnee,
}

impl MarketStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketStrategy::ParetoKnee => "pareto_knee",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "pareto_knee" => Some(MarketStrategy::ParetoKnee),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionOutcome {
    pub winners: Vec<Bid>,
    pub strategy_requested: String,
    pub strategy_applied: MarketStrategy,
    pub fell_back: bool,
    pub budget_ms: i64,
    pub spent_ms: u64,
    pub frontier: ParetoFrontier,
}

pub fn efficiency(bid: &Bid) -> f64 {
    bid.score / (bid.estimated_cost_ms as f64 + EFFICIENCY_EPSILON)
}

/// Selects winners whose cumulative estimated cost fits the budget.
/// Unknown strategy names run `pareto_knee` and report `fell_back`.
pub fn run_auction(bids: Vec<Bid>, budget: &dyn AvailableMs, strategy_name: &str) -> AuctionOutcome {
    let budget_ms = budget.available_ms();
    let (strategy_applied, fell_back) = match MarketStrategy::from_name(strategy_name) {
        Some(strategy) => (strategy, false),
        None => {
            tracing::warn!(
                target: "market",
                requested = strategy_name,
                applied = MarketStrategy::ParetoKnee.as_str(),
                "market_strategy_fallback"
            );
            (MarketStrategy::ParetoKnee, true)
        }
    };

    let frontier = pareto_frontier(&bids);
    let mut outcome = AuctionOutcome {
        winners: Vec::new(),
        strategy_requested: strategy_name.to_string(),
        strategy_applied,
        fell_back,
        budget_ms,
        spent_ms: 0,
        frontier,
    };

    if budget_ms <= 0 || bids.is_empty() {
        return outcome;
    }

    let (winners, spent_ms) = match strategy_applied {
        MarketStrategy::ParetoKnee => greedy_by_efficiency(bids, budget_ms as u64),
    };
    tracing::debug!(
        target: "market",
        strategy = strategy_applied.as_str(),
        budget_ms = budget_ms,
        spent_ms = spent_ms,
        winners = winners.len(),
        "auction_cleared"
    );
    outcome.winners = winners;
    outcome.spent_ms = spent_ms;
    outcome
}

fn greedy_by_efficiency(mut bids: Vec<Bid>, budget_ms: u64) -> (Vec<Bid>, u64) {
    bids.sort_by(|lhs, rhs| {
        efficiency(rhs)
            .total_cmp(&efficiency(lhs))
            .then_with(|| lhs.bid_id.cmp(&rhs.bid_id))
    });

    let mut spent = 0_u64;
    let mut winners = Vec::new();
    for bid in bids {
        let next = spent.saturating_add(bid.estimated_cost_ms);
        if next > budget_ms {
            continue;
        }
        spent = next;
        winners.push(bid);
    }
    (winners, spent)
}
