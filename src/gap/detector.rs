use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GapThresholds {
    pub postcondition_recurrence: usize,
    pub regret_min_samples: usize,
    pub regret_mean: f64,
    pub trending_coverage: f64,
}

impl Default for GapThresholds {
    fn default() -> Self {
        Self {
            postcondition_recurrence: 3,
            regret_min_samples: 5,
            regret_mean: 0.15,
            trending_coverage: 0.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GapTrigger {
    MissingCapability,
    PostconditionRecurrence { code: String, count: usize },
    ChronicRegret { mean: f64, samples: usize },
    TrendMisalignment { coverage: f64, trending_hosts: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct RegretStats {
    pub count: usize,
    pub mean: f64,
    pub max: f64,
}

impl RegretStats {
    pub fn from_window(window: &[f64]) -> Self {
        if window.is_empty() {
            return Self::default();
        }
        let sum: f64 = window.iter().sum();
        Self {
            count: window.len(),
            mean: sum / window.len() as f64,
            max: window.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityGapEvent {
    pub missing_capability: String,
    pub triggers: Vec<GapTrigger>,
    #[serde(default)]
    pub exemplars: Vec<Value>,
    pub postcondition_violations: BTreeMap<String, usize>,
    pub regret: RegretStats,
    #[serde(default)]
    pub trending_hosts: Vec<String>,
}

/// What the gap detector looks at for one chosen capability.
#[derive(Debug, Clone, Copy)]
pub struct GapInputs<'a> {
    pub chosen_capability: &'a str,
    pub known_capabilities: &'a BTreeSet<String>,
    pub postcondition_errors: &'a [String],
    pub regret_window: &'a [f64],
    pub trending_hosts: &'a [String],
}

pub fn detect_gap(inputs: GapInputs<'_>, thresholds: &GapThresholds) -> Option<CapabilityGapEvent> {
    let mut triggers = Vec::new();

    if !inputs.known_capabilities.contains(inputs.chosen_capability) {
        triggers.push(GapTrigger::MissingCapability);
    }

    let mut tally = BTreeMap::<String, usize>::new();
    for code in inputs.postcondition_errors {
        *tally.entry(code.clone()).or_insert(0) += 1;
    }
    for (code, count) in &tally {
        if *count >= thresholds.postcondition_recurrence {
            triggers.push(GapTrigger::PostconditionRecurrence {
                code: code.clone(),
                count: *count,
            });
        }
    }

    let regret = RegretStats::from_window(inputs.regret_window);
    if regret.count >= thresholds.regret_min_samples && regret.mean > thresholds.regret_mean {
        triggers.push(GapTrigger::ChronicRegret {
            mean: regret.mean,
            samples: regret.count,
        });
    }

    if let Some(coverage) = trending_coverage(inputs.chosen_capability, inputs.trending_hosts)
        && coverage < thresholds.trending_coverage
    {
        triggers.push(GapTrigger::TrendMisalignment {
            coverage,
            trending_hosts: inputs.trending_hosts.len(),
        });
    }

    if triggers.is_empty() {
        return None;
    }

    Some(CapabilityGapEvent {
        missing_capability: inputs.chosen_capability.to_string(),
        triggers,
        exemplars: Vec::new(),
        postcondition_violations: tally,
        regret,
        trending_hosts: inputs.trending_hosts.to_vec(),
    })
}

/// Share of trending hosts reflected in the capability string, `None` when
/// nothing is trending.
pub fn trending_coverage(capability: &str, trending_hosts: &[String]) -> Option<f64> {
    if trending_hosts.is_empty() {
        return None;
    }
    let capability = capability.to_ascii_lowercase();
    let reflected = trending_hosts
        .iter()
        .filter(|host| host_reflected(&capability, host))
        .count();
    Some(reflected as f64 / trending_hosts.len() as f64)
}

fn host_reflected(capability: &str, host: &str) -> bool {
    let host = host.trim().to_ascii_lowercase();
    if host.is_empty() {
        return false;
    }
    if capability.contains(&host) {
        return true;
    }
    let labels = host.split('.').collect::<Vec<_>>();
    let Some((_, significant)) = labels.split_last() else {
        return false;
    };
    significant
        .iter()
        .filter(|label| label.len() >= 3 && **label != "www")
        .any(|label| capability.contains(label))
}
