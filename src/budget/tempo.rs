use std::collections::BTreeMap;

use crate::budget::manager::BudgetManager;

pub const DEFAULT_TEMPO_ALPHA: f64 = 0.2;
pub const DEFAULT_MAX_RESERVE_FRAC: f64 = 0.6;

/// EWMA arrival-rate estimate per event type, turned into budget reserves.
#[derive(Debug, Clone)]
pub struct TempoForecaster {
    alpha: f64,
    max_reserve_frac: f64,
    ewma: BTreeMap<String, f64>,
}

impl Default for TempoForecaster {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPO_ALPHA, DEFAULT_MAX_RESERVE_FRAC)
    }
}

impl TempoForecaster {
    pub fn new(alpha: f64, max_reserve_frac: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            max_reserve_frac: max_reserve_frac.clamp(0.0, 1.0),
            ewma: BTreeMap::new(),
        }
    }

    pub fn observe_event(&mut self, event_type: &str) {
        let entry = self.ewma.entry(event_type.to_string()).or_insert(0.0);
        *entry = *entry * (1.0 - self.alpha) + self.alpha;
    }

    pub fn rate(&self, event_type: &str) -> f64 {
        self.ewma.get(event_type).copied().unwrap_or(0.0)
    }

    pub fn reserves_for_pool(&self, pool_ms: u64) -> BTreeMap<String, u64> {
        let total: f64 = self.ewma.values().sum();
        if total <= 0.0 {
            return BTreeMap::new();
        }

        self.ewma
            .iter()
            .map(|(event_type, rate)| {
                let share = rate / total;
                let reserve = (share * self.max_reserve_frac * pool_ms as f64).floor();
                (event_type.clone(), reserve.max(0.0) as u64)
            })
            .collect()
    }

    /// Replaces the budget's reserve table; nothing carries over between cycles.
    pub fn forecast_and_reserve(&self, budget: &mut BudgetManager) {
        let reserves = self.reserves_for_pool(budget.pool_ms());
        tracing::debug!(
            target: "budget.tempo",
            pool_ms = budget.pool_ms(),
            reserved_types = reserves.len(),
            reserved_total_ms = reserves.values().sum::<u64>(),
            "reserves_forecast"
        );
        budget.set_reserves(reserves);
    }
}
