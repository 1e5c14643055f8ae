use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::bidding::types::{TERM_COST_MS, TERM_INFO_GAIN, TERM_RISK, TERM_UTILITY};

/// Inputs shared by both scorers, derived from one event's salience and probes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BidBasis {
    pub utility: f64,
    pub info_gain: f64,
    pub risk: f64,
    pub risk_raw: f64,
    pub cost_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UtilityWeights {
    pub lambda_info_gain: f64,
    pub lambda_risk: f64,
    /// Price of one estimated millisecond.
    pub lambda_cost: f64,
}

impl Default for UtilityWeights {
    fn default() -> Self {
        Self {
            lambda_info_gain: 0.8,
            lambda_risk: 1.5,
            lambda_cost: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredTerms {
    pub score: f64,
    pub terms: BTreeMap<String, f64>,
}

/// `U + λ_IG·IG − λ_Risk·Risk − λ_Cost·CostMs`.
#[derive(Debug, Clone, Default)]
pub struct UtilityScorer {
    weights: UtilityWeights,
}

impl UtilityScorer {
    pub fn new(weights: UtilityWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &UtilityWeights {
        &self.weights
    }

    pub fn score(&self, basis: &BidBasis) -> ScoredTerms {
        let info_gain_term = self.weights.lambda_info_gain * basis.info_gain;
        let risk_term = self.weights.lambda_risk * basis.risk;
        let cost_term = self.weights.lambda_cost * basis.cost_ms as f64;

        ScoredTerms {
            score: basis.utility + info_gain_term - risk_term - cost_term,
            terms: BTreeMap::from([
                (TERM_UTILITY.to_string(), basis.utility),
                (TERM_INFO_GAIN.to_string(), basis.info_gain),
                (TERM_RISK.to_string(), basis.risk),
                (TERM_COST_MS.to_string(), basis.cost_ms as f64),
                ("weighted_info_gain".to_string(), info_gain_term),
                ("weighted_risk".to_string(), -risk_term),
                ("weighted_cost".to_string(), -cost_term),
            ]),
        }
    }
}
