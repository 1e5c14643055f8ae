use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    gap::RollbackContract,
    types::{CycleId, DecisionId, EventId},
};

/// Per-cycle hints from the policy service. Every field is optional; the
/// cycle falls back to configured defaults for anything absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PolicyHints {
    #[serde(default)]
    pub pool_ms: Option<u64>,
    #[serde(default)]
    pub reserve_ms: BTreeMap<String, u64>,
    #[serde(default)]
    pub bidding_arm: Option<String>,
    #[serde(default)]
    pub market_strategy: Option<String>,
    #[serde(default)]
    pub leak_gamma: Option<f64>,
    #[serde(default)]
    pub alpha: Option<f64>,
    #[serde(default)]
    pub alpha_per_head: BTreeMap<String, f64>,
    #[serde(default)]
    pub curiosity: Option<f64>,
    #[serde(default)]
    pub trending_hosts: Vec<String>,
    #[serde(default)]
    pub cost_multipliers: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeReport {
    pub cycle_id: CycleId,
    pub decision_id: DecisionId,
    pub dispatched: usize,
    pub succeeded: usize,
    pub success_rate: f64,
    /// Actual over allocated ms across dispatched winners.
    pub normalized_cost: f64,
    pub regret_mean: f64,
    pub regret_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRequest {
    pub intent_id: String,
    /// Canonical predicate set: sorted and deduplicated.
    pub predicates: Vec<String>,
    pub ttl_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityToken {
    pub token: String,
    pub issuer: String,
    pub audience: String,
    pub key_id: String,
    pub expires_at_ms: i64,
    pub predicates: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    ConformalOod,
    PostcondViolation,
    RollbackFailed,
    TwinMismatch,
    PlannerDecision,
}

impl EscalationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationReason::ConformalOod => "conformal_ood",
            EscalationReason::PostcondViolation => "postcond_violation",
            EscalationReason::RollbackFailed => "rollback_failed",
            EscalationReason::TwinMismatch => "twin_mismatch",
            EscalationReason::PlannerDecision => "planner_decision",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    pub reason: EscalationReason,
    pub cycle_id: CycleId,
    pub decision_id: DecisionId,
    #[serde(default)]
    pub event_id: Option<EventId>,
    #[serde(default)]
    pub detail: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchHeaders {
    pub decision_id: DecisionId,
    pub allocated_ms: u64,
    /// Absolute unix-ms deadline: dispatch time + allocated + slack.
    pub deadline_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchedIntent {
    pub intent_id: String,
    pub event_id: EventId,
    pub capability: String,
    #[serde(default)]
    pub params: Value,
    pub headers: DispatchHeaders,
    #[serde(default)]
    pub token: Option<CapabilityToken>,
    #[serde(default)]
    pub constraints: Value,
    pub rollback: RollbackContract,
    #[serde(default)]
    pub shadow: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub intent_id: String,
    pub success: bool,
    pub status: String,
    pub actual_ms: u64,
    #[serde(default)]
    pub output: Value,
    /// Error codes of postconditions that did not hold.
    #[serde(default)]
    pub postcondition_violations: Vec<String>,
    #[serde(default)]
    pub rollback_failed: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn failed(intent_id: &str, error: impl Into<String>) -> Self {
        Self {
            intent_id: intent_id.to_string(),
            success: false,
            status: "dispatch_failed".to_string(),
            actual_ms: 0,
            output: Value::Null,
            postcondition_violations: Vec::new(),
            rollback_failed: false,
            error: Some(error.into()),
        }
    }
}
