pub mod former;
pub mod free_energy;
pub mod probes;
pub mod types;
pub mod utility;

pub use former::BidFormer;
pub use free_energy::{EFE_OFFSET, FreeEnergyScorer};
pub use probes::{FETCH_CAPABILITY, LOOKUP_CAPABILITY, ProbePlanner, SEARCH_CAPABILITY};
pub use types::{
    Bid, BiddingPolicy, Probe, ProposedAction, ScorerKind, TERM_COST_MS, TERM_HOTSPOT,
    TERM_INFO_GAIN, TERM_RISK, TERM_UTILITY,
};
pub use utility::{BidBasis, ScoredTerms, UtilityScorer, UtilityWeights};
