use crate::budget::manager::BudgetManager;

/// Anything the auction can read a millisecond budget from.
pub trait AvailableMs {
    fn available_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBudget(pub i64);

impl AvailableMs for FixedBudget {
    fn available_ms(&self) -> i64 {
        self.0
    }
}

impl AvailableMs for BudgetManager {
    fn available_ms(&self) -> i64 {
        i64::try_from(self.available()).unwrap_or(i64::MAX)
    }
}

impl AvailableMs for i64 {
    fn available_ms(&self) -> i64 {
        *self
    }
}
