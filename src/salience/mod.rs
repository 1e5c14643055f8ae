pub mod engine;
pub mod error;
pub mod gate;
pub mod heads;
pub mod types;

pub use engine::SalienceEngine;
pub use error::{SalienceError, SalienceErrorKind};
pub use gate::{GATE_HIDDEN_UNITS, GateMixer, softmax, temperature_from_curiosity};
pub use heads::{
    HeadOutput, NOVELTY_HEAD, RELEVANCE_HEAD, RISK_HEAD, SalienceHead, URGENCY_HEAD,
    extract_hosts, tokenize,
};
pub use types::{GateContext, PriorSnapshot, SalienceReport, SalienceScore};
