use serde_json::{Value, json};

use crate::{
    bidding::{
        free_energy::FreeEnergyScorer,
        probes::ProbePlanner,
        types::{Bid, BiddingPolicy, Probe, ProposedAction, ScorerKind},
        utility::{BidBasis, ScoredTerms, UtilityScorer},
    },
    salience::{RISK_HEAD, SalienceReport},
    types::CanonicalEvent,
};

#[derive(Debug, Clone, Default)]
pub struct BidFormer {
    planner: ProbePlanner,
    utility: UtilityScorer,
    free_energy: FreeEnergyScorer,
    min_utility: f64,
}

impl BidFormer {
    pub fn new(planner: ProbePlanner, utility: UtilityScorer, min_utility: f64) -> Self {
        Self {
            planner,
            utility,
            free_energy: FreeEnergyScorer::default(),
            min_utility,
        }
    }

    pub fn planner(&self) -> &ProbePlanner {
        &self.planner
    }

    pub fn basis(report: &SalienceReport, probes: &[Probe]) -> BidBasis {
        BidBasis {
            utility: report.total_weighted(),
            info_gain: probes.iter().map(|probe| probe.info_gain).sum(),
            risk: report.weighted(RISK_HEAD),
            risk_raw: report.score(RISK_HEAD).map(|score| score.raw).unwrap_or(0.0),
            cost_ms: probes.iter().map(|probe| probe.cost_ms).sum(),
        }
    }

    /// Forms zero or more bids for one admitted event, one per scorer the
    /// policy arm enables. No probes or utility below the floor yields none.
    pub fn form_bids(
        &self,
        event: &CanonicalEvent,
        report: &SalienceReport,
        policy: BiddingPolicy,
    ) -> Vec<Bid> {
        let probes = self.planner.plan(event, report);
        let Some(primary) = probes.first() else {
            tracing::debug!(
                target: "bidding",
                event_id = %event.event_id,
                "no_probes_planned"
            );
            return Vec::new();
        };

        let basis = Self::basis(report, &probes);
        if basis.utility < self.min_utility {
            tracing::debug!(
                target: "bidding",
                event_id = %event.event_id,
                utility = basis.utility,
                min_utility = self.min_utility,
                "bid_not_warranted"
            );
            return Vec::new();
        }

        let action = ProposedAction {
            capability: primary.capability.clone(),
            params: action_params(event, primary, &probes),
        };

        policy
            .scorers()
            .iter()
            .map(|scorer| {
                let ScoredTerms { score, terms } = match scorer {
                    ScorerKind::Utility => self.utility.score(&basis),
                    ScorerKind::FreeEnergy => self.free_energy.score(&basis, &action.capability),
                };
                Bid {
                    bid_id: format!("bid:{}:{}", scorer.as_str(), event.event_id),
                    event_id: event.event_id.clone(),
                    source: event.source.clone(),
                    event_type: event.event_type.clone(),
                    scorer: *scorer,
                    score,
                    terms,
                    estimated_cost_ms: basis.cost_ms,
                    action: action.clone(),
                }
            })
            .collect()
    }
}

fn action_params(event: &CanonicalEvent, primary: &Probe, probes: &[Probe]) -> Value {
    let mut params = match &primary.params {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    params.insert("event_id".to_string(), json!(event.event_id));
    params.insert(
        "probes".to_string(),
        Value::Array(
            probes
                .iter()
                .map(|probe| json!({ "capability": probe.capability, "params": probe.params }))
                .collect(),
        ),
    );
    Value::Object(params)
}
