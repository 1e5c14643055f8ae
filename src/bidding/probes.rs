use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    bidding::types::Probe,
    salience::{NOVELTY_HEAD, RELEVANCE_HEAD, SalienceReport, extract_hosts},
    types::CanonicalEvent,
};

pub const FETCH_CAPABILITY: &str = "web.fetch";
pub const LOOKUP_CAPABILITY: &str = "kg.lookup";
pub const SEARCH_CAPABILITY: &str = "search.query";
const QUERY_CHAR_LIMIT: usize = 120;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbePlanner {
    pub fetch_cost_ms: u64,
    pub lookup_cost_ms: u64,
    pub search_cost_ms: u64,
    pub max_hosts: usize,
}

impl Default for ProbePlanner {
    fn default() -> Self {
        Self {
            fetch_cost_ms: 120,
            lookup_cost_ms: 40,
            search_cost_ms: 80,
            max_hosts: 3,
        }
    }
}

impl ProbePlanner {
    /// Cheap probes worth considering for `event`, highest information gain first.
    pub fn plan(&self, event: &CanonicalEvent, report: &SalienceReport) -> Vec<Probe> {
        let novelty = report.score(NOVELTY_HEAD).map(|score| score.raw).unwrap_or(0.0);
        let relevance = report.score(RELEVANCE_HEAD);
        let schema_match = relevance
            .and_then(|score| score.detail.get("schema_match"))
            .and_then(|value| value.as_f64())
            .unwrap_or(0.0);
        let keyword_hits = relevance
            .and_then(|score| score.detail.get("keyword_hits"))
            .and_then(|value| value.as_array())
            .cloned()
            .unwrap_or_default();

        let text = event.joined_text();
        let mut probes = Vec::new();

        for host in extract_hosts(&text).into_iter().take(self.max_hosts) {
            probes.push(Probe {
                capability: FETCH_CAPABILITY.to_string(),
                info_gain: 0.25 + 0.25 * novelty,
                cost_ms: self.fetch_cost_ms,
                params: json!({ "host": host }),
            });
        }

        if !keyword_hits.is_empty() {
            probes.push(Probe {
                capability: LOOKUP_CAPABILITY.to_string(),
                info_gain: 0.2 + 0.3 * (1.0 - schema_match),
                cost_ms: self.lookup_cost_ms,
                params: json!({ "keywords": keyword_hits }),
            });
        }

        if !text.is_empty() {
            let query = text.chars().take(QUERY_CHAR_LIMIT).collect::<String>();
            probes.push(Probe {
                capability: SEARCH_CAPABILITY.to_string(),
                info_gain: 0.15 + 0.35 * novelty,
                cost_ms: self.search_cost_ms,
                params: json!({ "query": query, "event_type": event.event_type }),
            });
        }

        probes.sort_by(|lhs, rhs| {
            rhs.info_gain
                .total_cmp(&lhs.info_gain)
                .then_with(|| lhs.capability.cmp(&rhs.capability))
        });
        probes
    }
}
