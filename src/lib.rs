pub mod bidding;
pub mod budget;
pub mod calibration;
pub mod cli;
pub mod collaborators;
pub mod config;
pub mod cycle;
pub mod field;
pub mod gap;
pub mod ledger;
pub mod logging;
pub mod market;
pub mod observability;
pub mod reflex;
pub mod runtime;
pub mod salience;
pub mod types;
