use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::json;

use crate::{
    collaborators::{
        error::{CollaboratorError, rejected},
        ports::{
            DeliberationPort, ExecutionPort, GapSynthesizerPort, KnowledgeGraphPort,
            PolicyHintsPort, SchemaPriorPort, TokenSignerPort,
        },
        types::{
            CapabilityToken, DispatchedIntent, Escalation, ExecutionResult, OutcomeReport,
            PolicyHints, TokenRequest,
        },
    },
    field::Adjacency,
    gap::{CapabilityGapEvent, GapResolution},
    salience::PriorSnapshot,
    types::{CanonicalEvent, CycleId, canonicalize_json, now_unix_ms},
};

/// Serves the configured hints every cycle and logs outcome reports.
#[derive(Debug, Clone, Default)]
pub struct StaticPolicyHints {
    hints: PolicyHints,
}

impl StaticPolicyHints {
    pub fn new(hints: PolicyHints) -> Self {
        Self { hints }
    }
}

#[async_trait]
impl PolicyHintsPort for StaticPolicyHints {
    async fn hints(&self, _cycle_id: CycleId) -> Result<PolicyHints, CollaboratorError> {
        Ok(self.hints.clone())
    }

    async fn report_outcome(&self, report: OutcomeReport) -> Result<(), CollaboratorError> {
        tracing::info!(
            target: "collaborators.policy",
            cycle_id = report.cycle_id,
            decision_id = %report.decision_id,
            success_rate = report.success_rate,
            normalized_cost = report.normalized_cost,
            regret_mean = report.regret_mean,
            regret_count = report.regret_count,
            "outcome_reported"
        );
        Ok(())
    }
}

const TOKEN_KEY_CONTEXT: &str = "vigil capability token 2025-01 signing key";

/// Local signer: keyed BLAKE3 over the canonical claims, with the key derived
/// from a shared secret.
#[derive(Clone)]
pub struct DigestTokenSigner {
    issuer: String,
    audience: String,
    key_id: String,
    key: [u8; 32],
}

impl std::fmt::Debug for DigestTokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestTokenSigner")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("key_id", &self.key_id)
            .finish()
    }
}

impl DigestTokenSigner {
    pub fn new(
        issuer: impl Into<String>,
        audience: impl Into<String>,
        key_id: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        let secret: String = secret.into();
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            key_id: key_id.into(),
            key: blake3::derive_key(TOKEN_KEY_CONTEXT, secret.as_bytes()),
        }
    }
}

#[async_trait]
impl TokenSignerPort for DigestTokenSigner {
    async fn sign(&self, request: TokenRequest) -> Result<CapabilityToken, CollaboratorError> {
        if request.intent_id.trim().is_empty() {
            return Err(rejected("token request is missing intent_id"));
        }
        let mut predicates = request.predicates;
        predicates.sort();
        predicates.dedup();

        let expires_at_ms = now_unix_ms().saturating_add(request.ttl_ms as i64);
        let claims = canonicalize_json(&json!({
            "intent_id": request.intent_id,
            "predicates": predicates,
            "issuer": self.issuer,
            "audience": self.audience,
            "key_id": self.key_id,
            "expires_at_ms": expires_at_ms,
        }));
        let mac = blake3::keyed_hash(&self.key, claims.to_string().as_bytes());

        Ok(CapabilityToken {
            token: format!("{}.{}", self.key_id, mac.to_hex()),
            issuer: self.issuer.clone(),
            audience: self.audience.clone(),
            key_id: self.key_id.clone(),
            expires_at_ms,
            predicates,
        })
    }
}

/// No graph: the cycle falls back to co-occurrence adjacency.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopKnowledgeGraph;

#[async_trait]
impl KnowledgeGraphPort for NoopKnowledgeGraph {
    async fn adjacency(&self, _nodes: &[String]) -> Result<Adjacency, CollaboratorError> {
        Ok(Adjacency::new())
    }
}

/// Keyword and host micro-priors from configuration; no schema matches.
#[derive(Debug, Clone, Default)]
pub struct StaticSchemaPriors {
    snapshot: PriorSnapshot,
}

impl StaticSchemaPriors {
    pub fn new(keyword_priors: BTreeMap<String, f64>, host_priors: BTreeMap<String, f64>) -> Self {
        Self {
            snapshot: PriorSnapshot {
                schema_matches: BTreeMap::new(),
                keyword_priors: keyword_priors
                    .into_iter()
                    .map(|(keyword, weight)| (keyword.to_lowercase(), weight))
                    .collect(),
                host_priors: host_priors
                    .into_iter()
                    .map(|(host, trust)| (host.to_lowercase(), trust))
                    .collect(),
            },
        }
    }
}

#[async_trait]
impl SchemaPriorPort for StaticSchemaPriors {
    async fn priors(&self, _events: &[CanonicalEvent]) -> Result<PriorSnapshot, CollaboratorError> {
        Ok(self.snapshot.clone())
    }
}

/// Resolves gaps from a configured substitution table; unknown gaps keep
/// their capability.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredGapSynthesizer {
    substitutes: BTreeMap<String, GapResolution>,
}

impl ConfiguredGapSynthesizer {
    pub fn new(substitutes: BTreeMap<String, GapResolution>) -> Self {
        Self { substitutes }
    }
}

#[async_trait]
impl GapSynthesizerPort for ConfiguredGapSynthesizer {
    async fn synthesize(&self, gap: &CapabilityGapEvent) -> Result<GapResolution, CollaboratorError> {
        Ok(self
            .substitutes
            .get(&gap.missing_capability)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingDeliberation;

#[async_trait]
impl DeliberationPort for LoggingDeliberation {
    async fn escalate(&self, escalation: Escalation) -> Result<(), CollaboratorError> {
        tracing::warn!(
            target: "collaborators.deliberation",
            reason = escalation.reason.as_str(),
            cycle_id = escalation.cycle_id,
            decision_id = %escalation.decision_id,
            event_id = ?escalation.event_id,
            detail = %escalation.detail,
            "escalation_received"
        );
        Ok(())
    }
}

/// Reports every intent as succeeded at exactly its allocated cost.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExecution;

impl NoopExecution {
    fn settle(intent: &DispatchedIntent) -> ExecutionResult {
        ExecutionResult {
            intent_id: intent.intent_id.clone(),
            success: true,
            status: "ok".to_string(),
            actual_ms: intent.headers.allocated_ms,
            output: json!({ "status": "ok", "capability": intent.capability }),
            postcondition_violations: Vec::new(),
            rollback_failed: false,
            error: None,
        }
    }
}

#[async_trait]
impl ExecutionPort for NoopExecution {
    async fn dispatch(&self, intent: DispatchedIntent) -> Result<ExecutionResult, CollaboratorError> {
        Ok(Self::settle(&intent))
    }

    async fn shadow_dispatch(
        &self,
        intent: DispatchedIntent,
    ) -> Result<ExecutionResult, CollaboratorError> {
        Ok(Self::settle(&intent))
    }
}
