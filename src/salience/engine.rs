use std::collections::BTreeSet;

use futures_util::future::join_all;

use crate::{
    salience::{
        error::{SalienceError, duplicate_head, gate_shape_mismatch},
        gate::GateMixer,
        heads::SalienceHead,
        types::{GateContext, PriorSnapshot, SalienceReport, SalienceScore},
    },
    types::CanonicalEvent,
};

#[derive(Debug, Clone)]
pub struct SalienceEngine {
    heads: Vec<SalienceHead>,
    gate: GateMixer,
}

impl SalienceEngine {
    pub fn new(heads: Vec<SalienceHead>, gate_seed: u64) -> Result<Self, SalienceError> {
        let mut seen = BTreeSet::new();
        for head in &heads {
            if !seen.insert(head.name()) {
                return Err(duplicate_head(head.name()));
            }
        }
        let gate = GateMixer::new(heads.len(), gate_seed);
        Ok(Self { heads, gate })
    }

    pub fn with_default_heads(gate_seed: u64) -> Self {
        Self {
            gate: GateMixer::new(SalienceHead::default_set().len(), gate_seed),
            heads: SalienceHead::default_set(),
        }
    }

    pub fn heads(&self) -> &[SalienceHead] {
        &self.heads
    }

    pub fn head_names(&self) -> Vec<&'static str> {
        self.heads.iter().map(|head| head.name()).collect()
    }

    pub fn gate(&self) -> &GateMixer {
        &self.gate
    }

    pub fn gate_weights(
        &self,
        context: &GateContext,
        temperature: f64,
    ) -> Result<Vec<f64>, SalienceError> {
        self.gate.weights(context, temperature)
    }

    /// Scores every head for one event concurrently and applies `weights`.
    pub async fn score_event(
        &self,
        event: &CanonicalEvent,
        priors: &PriorSnapshot,
        weights: &[f64],
    ) -> Result<SalienceReport, SalienceError> {
        if weights.len() != self.heads.len() {
            return Err(gate_shape_mismatch(self.heads.len(), weights.len()));
        }

        let outputs = join_all(
            self.heads
                .iter()
                .map(|head| async move { (head.name(), head.score(event, priors)) }),
        )
        .await;

        let scores = outputs
            .into_iter()
            .zip(weights)
            .map(|((head, output), weight)| SalienceScore {
                head: head.to_string(),
                raw: output.raw,
                weight: *weight,
                weighted: output.raw * weight,
                detail: output.detail,
            })
            .collect();

        Ok(SalienceReport {
            event_id: event.event_id.clone(),
            scores,
        })
    }
}
