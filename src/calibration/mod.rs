pub mod conformal;

pub use conformal::{
    AlphaPolicy, CalibrationSummary, ConformalCalibrator, DEFAULT_ALPHA, DEFAULT_HISTORY_CAPACITY,
    NEUTRAL_P_VALUE, OodVerdict, clamp_alpha,
};
