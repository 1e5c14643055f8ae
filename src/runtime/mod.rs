pub mod driver;
pub mod ingress;

pub use driver::{ExitReason, LoopReport, run, run_loop};
pub use ingress::{EventIngress, IngressError, IngressErrorKind, ReadReport, read_ndjson};
