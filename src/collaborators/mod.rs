pub mod error;
pub mod local;
pub mod ports;
pub mod types;

use std::sync::Arc;

pub use error::{
    CollaboratorError, CollaboratorErrorKind, invalid_response, rejected, timeout, unavailable,
};
pub use local::{
    ConfiguredGapSynthesizer, DigestTokenSigner, LoggingDeliberation, NoopExecution,
    NoopKnowledgeGraph, StaticPolicyHints, StaticSchemaPriors,
};
pub use ports::{
    DeliberationPort, ExecutionPort, GapSynthesizerPort, KnowledgeGraphPort, PolicyHintsPort,
    SchemaPriorPort, TokenSignerPort,
};
pub use types::{
    CapabilityToken, DispatchHeaders, DispatchedIntent, Escalation, EscalationReason,
    ExecutionResult, OutcomeReport, PolicyHints, TokenRequest,
};

use crate::config::Config;

/// Every external collaborator the decision cycle talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub policy: Arc<dyn PolicyHintsPort>,
    pub signer: Arc<dyn TokenSignerPort>,
    pub knowledge_graph: Arc<dyn KnowledgeGraphPort>,
    pub schema_priors: Arc<dyn SchemaPriorPort>,
    pub gap_synthesizer: Arc<dyn GapSynthesizerPort>,
    pub deliberation: Arc<dyn DeliberationPort>,
    pub execution: Arc<dyn ExecutionPort>,
}

impl Collaborators {
    /// In-process stand-ins built from configuration.
    pub fn local(config: &Config) -> Self {
        Self {
            policy: Arc::new(StaticPolicyHints::new(config.policy.clone())),
            signer: Arc::new(DigestTokenSigner::new(
                config.dispatch.token_issuer.clone(),
                config.dispatch.token_audience.clone(),
                config.dispatch.token_key_id.clone(),
                config.dispatch.token_secret.clone(),
            )),
            knowledge_graph: Arc::new(NoopKnowledgeGraph),
            schema_priors: Arc::new(StaticSchemaPriors::new(
                config.salience.keyword_priors.clone(),
                config.salience.host_priors.clone(),
            )),
            gap_synthesizer: Arc::new(ConfiguredGapSynthesizer::new(
                config.gap.substitutes.clone(),
            )),
            deliberation: Arc::new(LoggingDeliberation),
            execution: Arc::new(NoopExecution),
        }
    }

    pub fn with_execution(mut self, execution: Arc<dyn ExecutionPort>) -> Self {
        self.execution = execution;
        self
    }

    pub fn with_deliberation(mut self, deliberation: Arc<dyn DeliberationPort>) -> Self {
        self.deliberation = deliberation;
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn PolicyHintsPort>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_gap_synthesizer(mut self, gap_synthesizer: Arc<dyn GapSynthesizerPort>) -> Self {
        self.gap_synthesizer = gap_synthesizer;
        self
    }

    pub fn with_knowledge_graph(mut self, knowledge_graph: Arc<dyn KnowledgeGraphPort>) -> Self {
        self.knowledge_graph = knowledge_graph;
        self
    }
}
