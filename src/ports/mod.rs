//! Port traits: the engine's boundary with price data, settings and reports.

pub mod config_port;
pub mod price_port;
pub mod report_port;
