use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{CycleId, DecisionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Reasoning behind a decision.
    WhyTrace,
    /// Snapshot needed to reproduce a decision.
    ReplayCapsule,
}

impl RecordKind {
    pub const ALL: [RecordKind; 2] = [RecordKind::WhyTrace, RecordKind::ReplayCapsule];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::WhyTrace => "why_trace",
            RecordKind::ReplayCapsule => "replay_capsule",
        }
    }

    pub fn from_file_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == prefix)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub kind: RecordKind,
    pub decision_id: DecisionId,
    pub cycle_id: CycleId,
    pub recorded_at_ms: i64,
    pub body: Value,
}

/// A record as stored: its barcode and exact serialized line.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub barcode: String,
    pub serialized: String,
    pub record: DecisionRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestAlgorithm {
    Blake3Keyed,
    Sha256,
}
