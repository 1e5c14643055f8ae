use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

pub const DEFAULT_HISTORY_CAPACITY: usize = 512;
pub const DEFAULT_ALPHA: f64 = 0.05;
pub const NEUTRAL_P_VALUE: f64 = 0.5;
const ALPHA_FLOOR: f64 = 1e-6;
const ALPHA_CEILING: f64 = 0.5;

/// Significance level resolution: per-head hint, then global hint, then default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlphaPolicy {
    pub default_alpha: f64,
    #[serde(default)]
    pub global_override: Option<f64>,
    #[serde(default)]
    pub per_head: BTreeMap<String, f64>,
}

impl Default for AlphaPolicy {
    fn default() -> Self {
        Self {
            default_alpha: DEFAULT_ALPHA,
            global_override: None,
            per_head: BTreeMap::new(),
        }
    }
}

impl AlphaPolicy {
    pub fn alpha_for(&self, head: &str) -> f64 {
        let raw = self
            .per_head
            .get(head)
            .copied()
            .or(self.global_override)
            .unwrap_or(self.default_alpha);
        clamp_alpha(raw)
    }
}

pub fn clamp_alpha(alpha: f64) -> f64 {
    if !alpha.is_finite() {
        return DEFAULT_ALPHA;
    }
    alpha.clamp(ALPHA_FLOOR, ALPHA_CEILING)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSummary {
    pub min_p: f64,
    #[serde(default)]
    pub min_head: Option<String>,
    pub per_head_p: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OodVerdict {
    pub out_of_distribution: bool,
    pub min_p: f64,
    pub alpha: f64,
    #[serde(default)]
    pub triggering_heads: Vec<String>,
    pub per_head_p: BTreeMap<String, f64>,
    pub per_head_alpha: BTreeMap<String, f64>,
}

/// Rank-based upper-tail p-values over a bounded history per head.
#[derive(Debug, Clone)]
pub struct ConformalCalibrator {
    capacity: usize,
    histories: BTreeMap<String, VecDeque<f64>>,
}

impl Default for ConformalCalibrator {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl ConformalCalibrator {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            histories: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn history_len(&self, head: &str) -> usize {
        self.histories.get(head).map(VecDeque::len).unwrap_or(0)
    }

    pub fn update(&mut self, head: &str, score: f64) {
        if !score.is_finite() {
            return;
        }
        let history = self.histories.entry(head.to_string()).or_default();
        history.push_back(score);
        while history.len() > self.capacity {
            history.pop_front();
        }
    }

    pub fn p_value(&self, head: &str, score: f64) -> f64 {
        let Some(history) = self.histories.get(head).filter(|history| !history.is_empty()) else {
            return NEUTRAL_P_VALUE;
        };
        let at_or_above = history.iter().filter(|value| **value >= score).count();
        (at_or_above as f64 + 1.0) / (history.len() as f64 + 1.0)
    }

    pub fn summary(&self, scores: &BTreeMap<String, f64>) -> CalibrationSummary {
        let per_head_p = scores
            .iter()
            .map(|(head, score)| (head.clone(), self.p_value(head, *score)))
            .collect::<BTreeMap<_, _>>();

        let (min_head, min_p) = per_head_p
            .iter()
            .fold((None, 1.0_f64), |(best_head, best_p), (head, p)| {
                if *p < best_p {
                    (Some(head.clone()), *p)
                } else {
                    (best_head, best_p)
                }
            });

        CalibrationSummary {
            min_p: if per_head_p.is_empty() { NEUTRAL_P_VALUE } else { min_p },
            min_head,
            per_head_p,
        }
    }

    pub fn assess(&self, scores: &BTreeMap<String, f64>, alphas: &AlphaPolicy) -> OodVerdict {
        let summary = self.summary(scores);
        let per_head_alpha = summary
            .per_head_p
            .keys()
            .map(|head| (head.clone(), alphas.alpha_for(head)))
            .collect::<BTreeMap<_, _>>();

        let triggering_heads = summary
            .per_head_p
            .iter()
            .filter(|(head, p)| **p < per_head_alpha.get(*head).copied().unwrap_or(DEFAULT_ALPHA))
            .map(|(head, _)| head.clone())
            .collect::<Vec<_>>();

        let alpha = summary
            .min_head
            .as_deref()
            .map(|head| alphas.alpha_for(head))
            .unwrap_or_else(|| clamp_alpha(alphas.global_override.unwrap_or(alphas.default_alpha)));

        OodVerdict {
            out_of_distribution: !triggering_heads.is_empty(),
            min_p: summary.min_p,
            alpha,
            triggering_heads,
            per_head_p: summary.per_head_p,
            per_head_alpha,
        }
    }

    pub fn update_all(&mut self, scores: &BTreeMap<String, f64>) {
        for (head, score) in scores {
            self.update(head, *score);
        }
    }
}
