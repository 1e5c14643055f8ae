use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::salience::{
    error::{SalienceError, invalid_context},
    types::GateContext,
};

pub const GATE_HIDDEN_UNITS: usize = 32;
const GATE_INPUTS: usize = 2;
const MIN_TEMPERATURE: f64 = 1e-3;

/// Context-conditioned head weighting: one hidden ReLU layer followed by a
/// temperature-scaled softmax.
///
/// Weights come from a seeded RNG at construction and are never updated, so
/// the mixer is a fixed random projection that is reproducible per seed.
#[derive(Debug, Clone)]
pub struct GateMixer {
    seed: u64,
    head_count: usize,
    w1: Vec<[f64; GATE_INPUTS]>,
    b1: Vec<f64>,
    w2: Vec<Vec<f64>>,
    b2: Vec<f64>,
}

impl GateMixer {
    pub fn new(head_count: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let bound1 = (6.0 / (GATE_INPUTS + GATE_HIDDEN_UNITS) as f64).sqrt();
        let bound2 = (6.0 / (GATE_HIDDEN_UNITS + head_count.max(1)) as f64).sqrt();

        let w1 = (0..GATE_HIDDEN_UNITS)
            .map(|_| {
                [
                    rng.random_range(-bound1..bound1),
                    rng.random_range(-bound1..bound1),
                ]
            })
            .collect();
        let b1 = vec![0.0; GATE_HIDDEN_UNITS];
        let w2 = (0..head_count)
            .map(|_| {
                (0..GATE_HIDDEN_UNITS)
                    .map(|_| rng.random_range(-bound2..bound2))
                    .collect()
            })
            .collect();
        let b2 = vec![0.0; head_count];

        Self {
            seed,
            head_count,
            w1,
            b1,
            w2,
            b2,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn head_count(&self) -> usize {
        self.head_count
    }

    pub fn logits(&self, context: &GateContext) -> Vec<f64> {
        let input = context.features();
        let hidden = self
            .w1
            .iter()
            .zip(&self.b1)
            .map(|(row, bias)| (row[0] * input[0] + row[1] * input[1] + bias).max(0.0))
            .collect::<Vec<_>>();

        self.w2
            .iter()
            .zip(&self.b2)
            .map(|(row, bias)| {
                row.iter()
                    .zip(&hidden)
                    .map(|(weight, activation)| weight * activation)
                    .sum::<f64>()
                    + bias
            })
            .collect()
    }

    /// Per-head weights summing to 1.
    pub fn weights(
        &self,
        context: &GateContext,
        temperature: f64,
    ) -> Result<Vec<f64>, SalienceError> {
        if !temperature.is_finite() {
            return Err(invalid_context("gate temperature must be finite"));
        }
        if !context.avg_text_len.is_finite() {
            return Err(invalid_context("gate context avg_text_len must be finite"));
        }
        Ok(softmax(&self.logits(context), temperature))
    }
}

pub fn softmax(logits: &[f64], temperature: f64) -> Vec<f64> {
    if logits.is_empty() {
        return Vec::new();
    }
    let temperature = temperature.max(MIN_TEMPERATURE);
    let scaled = logits.iter().map(|logit| logit / temperature).collect::<Vec<_>>();
    let max = scaled.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps = scaled.iter().map(|value| (value - max).exp()).collect::<Vec<_>>();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|value| value / sum).collect()
}

/// Maps the affect-state curiosity signal in [0, 1] to a softmax temperature.
pub fn temperature_from_curiosity(curiosity: f64, t_min: f64, t_max: f64) -> f64 {
    let curiosity = if curiosity.is_finite() {
        curiosity.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let (low, high) = if t_min <= t_max {
        (t_min, t_max)
    } else {
        (t_max, t_min)
    };
    (low + curiosity * (high - low)).max(MIN_TEMPERATURE)
}
