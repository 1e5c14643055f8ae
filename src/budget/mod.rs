pub mod manager;
pub mod source;
pub mod tempo;

pub use manager::{BudgetManager, BudgetSnapshot};
pub use source::{AvailableMs, FixedBudget};
pub use tempo::{DEFAULT_MAX_RESERVE_FRAC, DEFAULT_TEMPO_ALPHA, TempoForecaster};
