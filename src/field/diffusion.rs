use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const DEFAULT_DIFFUSION_COEFFICIENT: f64 = 0.1;
pub const DEFAULT_HOTSPOT_THRESHOLD: f64 = 0.8;
pub const PRUNE_EPSILON: f64 = 1e-6;
pub const LEAK_GAMMA_MIN: f64 = 0.02;
pub const LEAK_GAMMA_MAX: f64 = 0.6;
const DYNAMIC_THRESHOLD_FRACTION: f64 = 0.75;

pub type Adjacency = BTreeMap<String, Vec<String>>;

pub fn clamp_leak_gamma(gamma: f64) -> f64 {
    if !gamma.is_finite() {
        return LEAK_GAMMA_MIN;
    }
    gamma.clamp(LEAK_GAMMA_MIN, LEAK_GAMMA_MAX)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hotspot {
    pub node: String,
    pub mass: f64,
}

/// Salience mass per node (event source) that persists across cycles.
#[derive(Debug, Clone)]
pub struct SalienceField {
    diffusion: f64,
    values: BTreeMap<String, f64>,
}

impl Default for SalienceField {
    fn default() -> Self {
        Self::new(DEFAULT_DIFFUSION_COEFFICIENT)
    }
}

impl SalienceField {
    pub fn new(diffusion: f64) -> Self {
        Self {
            diffusion,
            values: BTreeMap::new(),
        }
    }

    pub fn value(&self, node: &str) -> f64 {
        self.values.get(node).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<String, f64> {
        self.values.clone()
    }

    pub fn deposit(&mut self, nodes: &[String], mass: f64) {
        if nodes.is_empty() || !mass.is_finite() {
            return;
        }
        let share = mass / nodes.len() as f64;
        for node in nodes {
            *self.values.entry(node.clone()).or_insert(0.0) += share;
        }
    }

    /// One explicit Laplacian step over the nodes named in `adjacency`,
    /// computed from the pre-step values. Nodes outside `adjacency` are left
    /// as they are.
    pub fn diffuse(&mut self, adjacency: &Adjacency, leak_gamma: f64) {
        let gamma = clamp_leak_gamma(leak_gamma);
        let before = self.values.clone();
        let read = |node: &str| before.get(node).copied().unwrap_or(0.0);

        for (node, neighbors) in adjacency {
            let current = read(node);
            let neighbor_sum: f64 = neighbors.iter().map(|neighbor| read(neighbor)).sum();
            let degree = neighbors.len() as f64;
            let next = (1.0 - gamma) * current + self.diffusion * (neighbor_sum - degree * current);
            self.values.insert(node.clone(), next);
        }

        self.values.retain(|_, value| *value >= PRUNE_EPSILON);
    }

    /// Nodes above `max(static_threshold, 0.75 × max value)`, highest first.
    pub fn detect_hotspots(&self, static_threshold: f64) -> Vec<Hotspot> {
        let max = self.values.values().copied().fold(0.0_f64, f64::max);
        let threshold = static_threshold.max(DYNAMIC_THRESHOLD_FRACTION * max);

        let mut hotspots = self
            .values
            .iter()
            .filter(|(_, value)| **value > threshold)
            .map(|(node, value)| Hotspot {
                node: node.clone(),
                mass: *value,
            })
            .collect::<Vec<_>>();
        hotspots.sort_by(|lhs, rhs| rhs.mass.total_cmp(&lhs.mass).then_with(|| lhs.node.cmp(&rhs.node)));
        hotspots
    }
}

/// Fallback adjacency when the knowledge graph has nothing: sources that
/// share an event type within the batch are neighbours.
pub fn co_occurrence_adjacency<'a>(
    pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Adjacency {
    let mut by_type: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (source, event_type) in pairs {
        let sources = by_type.entry(event_type).or_default();
        if !sources.contains(&source) {
            sources.push(source);
        }
    }

    let mut adjacency: Adjacency = BTreeMap::new();
    for sources in by_type.values() {
        for source in sources {
            let neighbors = adjacency.entry(source.to_string()).or_default();
            for other in sources {
                if other != source && !neighbors.iter().any(|existing| existing == other) {
                    neighbors.push(other.to_string());
                }
            }
        }
    }
    adjacency
}
