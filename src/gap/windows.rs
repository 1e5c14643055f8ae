use std::collections::{BTreeMap, VecDeque};

pub const DEFAULT_OUTCOME_WINDOW: usize = 32;

/// Regret of one executed action: 1.0 for a failure, otherwise the
/// relative cost overrun clamped to [0, 1].
pub fn regret_for(success: bool, allocated_ms: u64, actual_ms: u64) -> f64 {
    if !success {
        return 1.0;
    }
    if allocated_ms == 0 {
        return if actual_ms == 0 { 0.0 } else { 1.0 };
    }
    ((actual_ms as f64 - allocated_ms as f64) / allocated_ms as f64).clamp(0.0, 1.0)
}

/// Bounded per-capability windows of postcondition error codes and regret.
#[derive(Debug, Clone)]
pub struct OutcomeWindows {
    capacity: usize,
    postcondition_errors: BTreeMap<String, VecDeque<String>>,
    regret: BTreeMap<String, VecDeque<f64>>,
}

impl Default for OutcomeWindows {
    fn default() -> Self {
        Self::new(DEFAULT_OUTCOME_WINDOW)
    }
}

impl OutcomeWindows {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            postcondition_errors: BTreeMap::new(),
            regret: BTreeMap::new(),
        }
    }

    pub fn record_postcondition_error(&mut self, capability: &str, code: &str) {
        let window = self
            .postcondition_errors
            .entry(capability.to_string())
            .or_default();
        window.push_back(code.to_string());
        while window.len() > self.capacity {
            window.pop_front();
        }
    }

    pub fn record_regret(&mut self, capability: &str, regret: f64) {
        let window = self.regret.entry(capability.to_string()).or_default();
        window.push_back(regret.clamp(0.0, 1.0));
        while window.len() > self.capacity {
            window.pop_front();
        }
    }

    pub fn postcondition_errors(&self, capability: &str) -> Vec<String> {
        self.postcondition_errors
            .get(capability)
            .map(|window| window.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn regret_window(&self, capability: &str) -> Vec<f64> {
        self.regret
            .get(capability)
            .map(|window| window.iter().copied().collect())
            .unwrap_or_default()
    }
}
