use std::collections::BTreeMap;

use crate::bidding::{
    types::{TERM_COST_MS, TERM_INFO_GAIN, TERM_RISK, TERM_UTILITY},
    utility::{BidBasis, ScoredTerms},
};

pub const EFE_OFFSET: f64 = 1000.0;

const STATE_SAFE: usize = 0;
const STATE_THREAT: usize = 1;
const OBS_BENIGN: usize = 0;
const OBS_ALARMING: usize = 1;

/// Fixed two-state (safe/threat) generative model scored by expected free
/// energy. Lower EFE is better; bids carry `1000 − EFE`.
#[derive(Debug, Clone)]
pub struct FreeEnergyScorer {
    prior: [f64; 2],
    /// `likelihood[state][observation]`.
    likelihood: [[f64; 2]; 2],
    threat_preference: f64,
    action_exposure: BTreeMap<String, f64>,
}

impl Default for FreeEnergyScorer {
    fn default() -> Self {
        Self {
            prior: [0.95, 0.05],
            likelihood: [[0.9, 0.1], [0.2, 0.8]],
            threat_preference: -4.0,
            action_exposure: BTreeMap::from([
                ("web.fetch".to_string(), 1.0),
                ("search.query".to_string(), 0.9),
                ("kg.lookup".to_string(), 0.8),
            ]),
        }
    }
}

impl FreeEnergyScorer {
    fn posterior_threat(&self, observation: usize) -> f64 {
        let joint_threat = self.likelihood[STATE_THREAT][observation] * self.prior[STATE_THREAT];
        let joint_safe = self.likelihood[STATE_SAFE][observation] * self.prior[STATE_SAFE];
        let evidence = joint_threat + joint_safe;
        if evidence <= 0.0 {
            self.prior[STATE_THREAT]
        } else {
            joint_threat / evidence
        }
    }

    /// P(threat) given soft evidence: the risk head's raw score is read as
    /// the probability that the observation is alarming.
    pub fn threat_probability(&self, risk_raw: f64) -> f64 {
        let alarming = risk_raw.clamp(0.0, 1.0);
        alarming * self.posterior_threat(OBS_ALARMING)
            + (1.0 - alarming) * self.posterior_threat(OBS_BENIGN)
    }

    pub fn score(&self, basis: &BidBasis, capability: &str) -> ScoredTerms {
        let p_threat = self.threat_probability(basis.risk_raw);
        let exposure = self.action_exposure.get(capability).copied().unwrap_or(1.0);
        let p_threat_given_action = (p_threat * exposure).clamp(0.0, 1.0);

        let risk = -(p_threat_given_action * self.threat_preference);
        let ambiguity = if p_threat > 0.0 {
            -p_threat * p_threat.ln()
        } else {
            0.0
        };
        let efe = risk + ambiguity;

        ScoredTerms {
            score: EFE_OFFSET - efe,
            terms: BTreeMap::from([
                (TERM_UTILITY.to_string(), basis.utility),
                (TERM_INFO_GAIN.to_string(), basis.info_gain),
                (TERM_RISK.to_string(), basis.risk),
                (TERM_COST_MS.to_string(), basis.cost_ms as f64),
                ("p_threat".to_string(), p_threat),
                ("efe_risk".to_string(), risk),
                ("efe_ambiguity".to_string(), ambiguity),
                ("efe".to_string(), efe),
            ]),
        }
    }
}
