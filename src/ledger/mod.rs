pub mod error;
pub mod store;
pub mod types;

pub use error::LedgerError;
pub use store::DecisionLedger;
pub use types::{DecisionRecord, DigestAlgorithm, RecordKind, StoredRecord};
