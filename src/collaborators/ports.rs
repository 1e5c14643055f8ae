use async_trait::async_trait;

use crate::{
    collaborators::{
        error::CollaboratorError,
        types::{
            CapabilityToken, DispatchedIntent, Escalation, ExecutionResult, OutcomeReport,
            PolicyHints, TokenRequest,
        },
    },
    field::Adjacency,
    gap::{CapabilityGapEvent, GapResolution},
    salience::PriorSnapshot,
    types::{CanonicalEvent, CycleId},
};

#[async_trait]
pub trait PolicyHintsPort: Send + Sync {
    async fn hints(&self, cycle_id: CycleId) -> Result<PolicyHints, CollaboratorError>;

    async fn report_outcome(&self, report: OutcomeReport) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait TokenSignerPort: Send + Sync {
    async fn sign(&self, request: TokenRequest) -> Result<CapabilityToken, CollaboratorError>;
}

#[async_trait]
pub trait KnowledgeGraphPort: Send + Sync {
    /// Adjacency between the given field nodes.
    async fn adjacency(&self, nodes: &[String]) -> Result<Adjacency, CollaboratorError>;
}

#[async_trait]
pub trait SchemaPriorPort: Send + Sync {
    async fn priors(&self, events: &[CanonicalEvent]) -> Result<PriorSnapshot, CollaboratorError>;
}

#[async_trait]
pub trait GapSynthesizerPort: Send + Sync {
    async fn synthesize(&self, gap: &CapabilityGapEvent) -> Result<GapResolution, CollaboratorError>;
}

#[async_trait]
pub trait DeliberationPort: Send + Sync {
    async fn escalate(&self, escalation: Escalation) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait ExecutionPort: Send + Sync {
    async fn dispatch(&self, intent: DispatchedIntent) -> Result<ExecutionResult, CollaboratorError>;

    async fn shadow_dispatch(
        &self,
        intent: DispatchedIntent,
    ) -> Result<ExecutionResult, CollaboratorError>;
}
