use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    bidding::BiddingPolicy,
    calibration::OodVerdict,
    collaborators::{DispatchedIntent, EscalationReason, ExecutionResult, OutcomeReport},
    field::Hotspot,
    gap::{CapabilityGapEvent, RollbackContract},
    market::MarketStrategy,
    reflex::ReflexVerdict,
    types::{CycleId, DecisionId, EventId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventDisposition {
    /// Conformal OOD; routed to deliberation, no bid.
    Escalated,
    /// A `block` reflex fired.
    Blocked,
    NoBid,
    /// Bid but did not win the auction.
    Outbid,
    /// Won the auction but the budget slice was denied.
    AllocationDenied,
    Dispatched,
    DispatchFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventStatus {
    pub event_id: EventId,
    pub disposition: EventDisposition,
    #[serde(default)]
    pub reflex: Option<ReflexVerdict>,
    #[serde(default)]
    pub calibration: Option<OodVerdict>,
    pub bid_count: usize,
    #[serde(default)]
    pub escalations: Vec<EscalationReason>,
    #[serde(default)]
    pub intent_ids: Vec<String>,
}

impl EventStatus {
    pub fn new(event_id: &str) -> Self {
        Self {
            event_id: event_id.to_string(),
            disposition: EventDisposition::NoBid,
            reflex: None,
            calibration: None,
            bid_count: 0,
            escalations: Vec::new(),
            intent_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostAudit {
    pub allocated_ms: u64,
    pub actual_ms: u64,
    pub overrun_ms: u64,
    pub within_budget: bool,
}

impl CostAudit {
    pub fn new(allocated_ms: u64, actual_ms: u64) -> Self {
        Self {
            allocated_ms,
            actual_ms,
            overrun_ms: actual_ms.saturating_sub(allocated_ms),
            within_budget: actual_ms <= allocated_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowTrial {
    pub result: ExecutionResult,
    pub matched: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinnerOutcome {
    pub bid_id: String,
    pub event_id: EventId,
    pub intent: DispatchedIntent,
    pub result: ExecutionResult,
    pub audit: CostAudit,
    pub regret: f64,
    #[serde(default)]
    pub gap: Option<CapabilityGapEvent>,
    /// Rollback contract re-resolved against the forward result.
    pub settled_rollback: RollbackContract,
    #[serde(default)]
    pub shadow: Option<ShadowTrial>,
    #[serde(default)]
    pub escalations: Vec<EscalationReason>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerBarcodes {
    pub why_trace: String,
    pub replay_capsule: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionSummary {
    pub cycle_id: CycleId,
    pub decision_id: DecisionId,
    pub policy: BiddingPolicy,
    pub strategy_requested: String,
    pub strategy_applied: MarketStrategy,
    pub strategy_fell_back: bool,
    pub temperature: f64,
    pub gate_weights: BTreeMap<String, f64>,
    pub budget_ms: i64,
    /// Milliseconds actually granted to dispatched winners.
    pub spent_ms: u64,
    /// Cost of every auction winner, including those skipped before dispatch.
    pub auction_spent_ms: u64,
    pub statuses: BTreeMap<EventId, EventStatus>,
    pub winners: Vec<WinnerOutcome>,
    pub hotspots: Vec<Hotspot>,
    pub outcome: OutcomeReport,
    /// Collaborators that failed this cycle and were replaced by defaults.
    pub fallbacks: Vec<String>,
    #[serde(default)]
    pub ledger: Option<LedgerBarcodes>,
}

impl DecisionSummary {
    pub fn status(&self, event_id: &str) -> Option<&EventStatus> {
        self.statuses.get(event_id)
    }

    pub fn disposition(&self, event_id: &str) -> Option<EventDisposition> {
        self.status(event_id).map(|status| status.disposition)
    }
}
