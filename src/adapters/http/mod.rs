//! Blocking HTTP price sources.
//!
//! Every client carries its own request timeout; failures surface as
//! `PriceSource` errors and the resolver chain moves on to the next source.

pub mod horizon;
pub mod metadata;
pub mod quote;

use std::time::Duration;

use reqwest::blocking::Client;
use tracing::debug;

use crate::domain::error::VaultsimError;

pub use horizon::HorizonAdapter;
pub use metadata::ContractMetadataAdapter;
pub use quote::QuoteApiAdapter;

pub(crate) fn build_client(source: &str, timeout_secs: u64) -> Result<Client, VaultsimError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("vaultsim/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| VaultsimError::price_source(source, format!("failed to build client: {e}")))
}

/// GETs `url` and decodes the body as JSON. Non-2xx statuses are errors.
pub(crate) fn get_json(
    client: &Client,
    source: &str,
    url: &str,
    query: &[(&str, String)],
) -> Result<serde_json::Value, VaultsimError> {
    debug!(source, url, "Requesting prices");

    let response = client.get(url).query(query).send().map_err(|e| {
        let reason = if e.is_timeout() {
            "request timed out".to_string()
        } else {
            e.to_string()
        };
        VaultsimError::price_source(source, reason)
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(VaultsimError::price_source(
            source,
            format!("HTTP {}: {}", status, body.chars().take(200).collect::<String>()),
        ));
    }

    response
        .json::<serde_json::Value>()
        .map_err(|e| VaultsimError::price_source(source, format!("invalid JSON: {e}")))
}

/// Trims a trailing slash so paths can be appended with `/`.
pub(crate) fn base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
