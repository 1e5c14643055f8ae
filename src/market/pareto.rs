use serde::{Deserialize, Serialize};

use crate::bidding::{Bid, TERM_COST_MS, TERM_INFO_GAIN, TERM_RISK, TERM_UTILITY};

/// Four objectives of one bid: maximize utility and info gain, minimize risk and cost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Objectives {
    pub utility: f64,
    pub info_gain: f64,
    pub risk: f64,
    pub cost_ms: f64,
}

impl Objectives {
    pub fn of(bid: &Bid) -> Self {
        let cost_ms = if bid.terms.contains_key(TERM_COST_MS) {
            bid.term(TERM_COST_MS)
        } else {
            bid.estimated_cost_ms as f64
        };
        Self {
            utility: bid.term(TERM_UTILITY),
            info_gain: bid.term(TERM_INFO_GAIN),
            risk: bid.term(TERM_RISK),
            cost_ms,
        }
    }

    /// True when `self` is at least as good on every objective and strictly
    /// better on one.
    pub fn dominates(&self, other: &Objectives) -> bool {
        let no_worse = self.utility >= other.utility
            && self.info_gain >= other.info_gain
            && self.risk <= other.risk
            && self.cost_ms <= other.cost_ms;
        let strictly_better = self.utility > other.utility
            || self.info_gain > other.info_gain
            || self.risk < other.risk
            || self.cost_ms < other.cost_ms;
        no_worse && strictly_better
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierPoint {
    pub bid_id: String,
    pub objectives: Objectives,
    /// `(n_utility + n_info_gain) / 2`.
    pub benefit: f64,
    /// `1 − (n_risk + n_cost) / 2`; higher is cheaper and safer.
    pub cost: f64,
    pub distance_to_ideal: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ParetoFrontier {
    pub points: Vec<FrontierPoint>,
    pub knee: Option<String>,
}

fn normalizer(values: Vec<f64>) -> impl Fn(f64) -> f64 {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    move |value| {
        let span = max - min;
        if span.is_finite() && span > 0.0 {
            (value - min) / span
        } else {
            0.0
        }
    }
}

/// Non-dominated bids with a knee point, for explainability only.
pub fn pareto_frontier(bids: &[Bid]) -> ParetoFrontier {
    let candidates = bids
        .iter()
        .map(|bid| (bid.bid_id.clone(), Objectives::of(bid)))
        .collect::<Vec<_>>();

    let frontier = candidates
        .iter()
        .filter(|(_, objectives)| {
            !candidates
                .iter()
                .any(|(_, other)| other.dominates(objectives))
        })
        .cloned()
        .collect::<Vec<_>>();

    if frontier.is_empty() {
        return ParetoFrontier::default();
    }

    let n_utility = normalizer(frontier.iter().map(|(_, o)| o.utility).collect());
    let n_info_gain = normalizer(frontier.iter().map(|(_, o)| o.info_gain).collect());
    let n_risk = normalizer(frontier.iter().map(|(_, o)| o.risk).collect());
    let n_cost = normalizer(frontier.iter().map(|(_, o)| o.cost_ms).collect());

    let points = frontier
        .into_iter()
        .map(|(bid_id, objectives)| {
            let benefit = (n_utility(objectives.utility) + n_info_gain(objectives.info_gain)) / 2.0;
            let cost = 1.0 - (n_risk(objectives.risk) + n_cost(objectives.cost_ms)) / 2.0;
            let distance_to_ideal = ((1.0 - benefit).powi(2) + (1.0 - cost).powi(2)).sqrt();
            FrontierPoint {
                bid_id,
                objectives,
                benefit,
                cost,
                distance_to_ideal,
            }
        })
        .collect::<Vec<_>>();

    let knee = points
        .iter()
        .min_by(|lhs, rhs| lhs.distance_to_ideal.total_cmp(&rhs.distance_to_ideal))
        .map(|point| point.bid_id.clone());

    ParetoFrontier { points, knee }
}
