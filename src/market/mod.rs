pub mod auction;
pub mod pareto;

pub use auction::{AuctionOutcome, EFFICIENCY_EPSILON, MarketStrategy, efficiency, run_auction};
pub use pareto::{FrontierPoint, Objectives, ParetoFrontier, pareto_frontier};
