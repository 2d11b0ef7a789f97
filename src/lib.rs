//! vaultsim: backtesting for rule-driven token vault rebalancing.
//!
//! Hexagonal architecture: the simulation, pricing and metrics live in
//! [`domain`], port traits in [`ports`], concrete price sources, config and
//! report writers in [`adapters`], and the command line in [`cli`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
