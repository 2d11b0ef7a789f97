//! Core domain types and logic.

pub mod vault;
pub mod price;
pub mod pricing;
pub mod portfolio;
pub mod execution;
pub mod rule_eval;
pub mod backtest;
pub mod metrics;
pub mod config_validation;
pub mod error;
