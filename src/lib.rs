//! Spatial public-goods games with ostracism on a toroidal lattice.
//!
//! ```text
//! Simulation::step_generation
//!   └─ L² × update_site (random focal, random neighbor)
//!        └─ total_payoff × 2  (focal, neighbor)
//!             └─ for each of 5 groups: evaluate_exclusion → play_game
//! ```
//!
//! The exclusion buffer is reset once per generation and filled while
//! payoffs are aggregated, so later attempts in a generation see the marks
//! left by earlier ones.

pub mod config;
pub mod exclusion;
pub mod lattice;
pub mod logging;
pub mod payoff;
pub mod simulation;
pub mod snapshot;
pub mod storage;
pub mod strategy;
pub mod sweep;
pub mod update;
