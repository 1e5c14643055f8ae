pub mod error;
pub mod orchestrator;
pub mod types;

pub use error::{CycleError, CycleErrorKind, internal_error, invalid_batch};
pub use orchestrator::DecisionCycle;
pub use types::{
    CostAudit, DecisionSummary, EventDisposition, EventStatus, LedgerBarcodes, ShadowTrial,
    WinnerOutcome,
};
