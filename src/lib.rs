//! Credit portfolio detox: a loan-book simulation where a player swaps loans
//! in and out to push profitability up and loss concentration down.
//!
//! The core is [`generator`] (random loans) and [`metrics`] (exposure,
//! profitability, risk-weighted concentration, score). [`session`] owns a
//! portfolio and applies accept/reject decisions; [`simulation`] drives a
//! session on a simulated clock against a [`player::Player`].

pub mod analysis;
pub mod config;
pub mod error;
pub mod events;
pub mod generator;
pub mod loan;
pub mod metrics;
pub mod player;
pub mod session;
pub mod simulation;
pub mod types;

pub use error::{DetoxError, Result};
