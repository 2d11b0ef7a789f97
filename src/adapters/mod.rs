//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod failover_source;
pub mod file_config_adapter;
pub mod json_report_adapter;
#[cfg(feature = "http")]
pub mod http;
