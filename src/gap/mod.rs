pub mod detector;
pub mod playbook;
pub mod rollback;
pub mod windows;

pub use detector::{
    CapabilityGapEvent, GapInputs, GapThresholds, GapTrigger, RegretStats, detect_gap,
    trending_coverage,
};
pub use playbook::{GapResolution, apply_resolution, merge_playbook};
pub use rollback::{
    CapabilitySpec, Condition, ConditionOp, CriticalReview, DEFERRED_REFERENCE_KEY,
    RollbackContract, default_guards, lookup_path, synthesize_rollback,
};
pub use windows::{DEFAULT_OUTCOME_WINDOW, OutcomeWindows, regret_for};
