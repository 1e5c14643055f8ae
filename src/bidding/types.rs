use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::EventId;

pub const TERM_UTILITY: &str = "utility";
pub const TERM_INFO_GAIN: &str = "info_gain";
pub const TERM_RISK: &str = "risk";
pub const TERM_COST_MS: &str = "cost_ms";
pub const TERM_HOTSPOT: &str = "hotspot";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerKind {
    Utility,
    FreeEnergy,
}

impl ScorerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScorerKind::Utility => "utility",
            ScorerKind::FreeEnergy => "free_energy",
        }
    }
}

/// Active bidding-policy arm, as named by the policy service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BiddingPolicy {
    #[default]
    Utility,
    FreeEnergy,
    Hybrid,
}

impl BiddingPolicy {
    pub fn from_arm(arm: &str) -> Option<Self> {
        match arm.trim().to_ascii_lowercase().as_str() {
            "utility" | "fae" => Some(BiddingPolicy::Utility),
            "free_energy" | "efe" | "active_inference" => Some(BiddingPolicy::FreeEnergy),
            "hybrid" => Some(BiddingPolicy::Hybrid),
            _ => None,
        }
    }

    pub fn scorers(&self) -> &'static [ScorerKind] {
        match self {
            BiddingPolicy::Utility => &[ScorerKind::Utility],
            BiddingPolicy::FreeEnergy => &[ScorerKind::FreeEnergy],
            BiddingPolicy::Hybrid => &[ScorerKind::Utility, ScorerKind::FreeEnergy],
        }
    }
}

/// A cheap search/enrichment step considered for an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Probe {
    pub capability: String,
    pub info_gain: f64,
    pub cost_ms: u64,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedAction {
    pub capability: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub bid_id: String,
    pub event_id: EventId,
    pub source: String,
    pub event_type: String,
    pub scorer: ScorerKind,
    pub score: f64,
    pub terms: BTreeMap<String, f64>,
    pub estimated_cost_ms: u64,
    pub action: ProposedAction,
}

impl Bid {
    pub fn term(&self, name: &str) -> f64 {
        self.terms.get(name).copied().unwrap_or(0.0)
    }

    pub fn add_term(&mut self, name: &str, value: f64) {
        self.score += value;
        *self.terms.entry(name.to_string()).or_insert(0.0) += value;
    }
}
