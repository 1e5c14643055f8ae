use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::EventId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalienceScore {
    pub head: String,
    pub raw: f64,
    pub weight: f64,
    pub weighted: f64,
    #[serde(default)]
    pub detail: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SalienceReport {
    pub event_id: EventId,
    pub scores: Vec<SalienceScore>,
}

impl SalienceReport {
    pub fn score(&self, head: &str) -> Option<&SalienceScore> {
        self.scores.iter().find(|score| score.head == head)
    }

    pub fn weighted(&self, head: &str) -> f64 {
        self.score(head).map(|score| score.weighted).unwrap_or(0.0)
    }

    pub fn total_weighted(&self) -> f64 {
        self.scores.iter().map(|score| score.weighted).sum()
    }

    pub fn weighted_by_head(&self) -> BTreeMap<String, f64> {
        self.scores
            .iter()
            .map(|score| (score.head.clone(), score.weighted))
            .collect()
    }

    /// Detail map of the risk head; the reflex catalog keys off these flags.
    pub fn risk_details(&self) -> BTreeMap<String, Value> {
        self.score(super::heads::RISK_HEAD)
            .map(|score| score.detail.clone())
            .unwrap_or_default()
    }
}

/// Per-cycle snapshot of the external priors the heads may consult.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PriorSnapshot {
    /// Schema/embedding match strength per event, in [0, 1].
    #[serde(default)]
    pub schema_matches: BTreeMap<EventId, f64>,
    /// Harvested keyword micro-priors, keyword (lowercase) to weight in [0, 1].
    #[serde(default)]
    pub keyword_priors: BTreeMap<String, f64>,
    /// Host micro-priors, host to trust in [0, 1].
    #[serde(default)]
    pub host_priors: BTreeMap<String, f64>,
}

/// Input to the gate mixer network.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateContext {
    pub batch_size: usize,
    pub avg_text_len: f64,
}

impl GateContext {
    pub fn features(&self) -> [f64; 2] {
        [
            (self.batch_size as f64).ln_1p(),
            self.avg_text_len.max(0.0).ln_1p(),
        ]
    }
}
