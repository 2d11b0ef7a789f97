//! Best-effort symbol lookup for contract tokens via an explorer endpoint.

use reqwest::blocking::Client;
use tracing::debug;

use super::{base_url, build_client, get_json};
use crate::domain::error::VaultsimError;
use crate::ports::price_port::SymbolResolver;

const SOURCE_NAME: &str = "contract_metadata";

/// Symbol from `{"asset": "CODE-ISSUER-1"}` or `{"symbol": "CODE"}`.
pub fn parse_symbol(body: &serde_json::Value) -> Option<String> {
    let from_asset = body
        .get("asset")
        .and_then(|a| a.as_str())
        .and_then(|a| a.split('-').next())
        .map(str::trim)
        .filter(|code| !code.is_empty());
    let from_symbol = || {
        body.get("symbol")
            .and_then(|s| s.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };
    from_asset.or_else(from_symbol).map(str::to_string)
}

pub struct ContractMetadataAdapter {
    client: Client,
    base_url: String,
}

impl ContractMetadataAdapter {
    pub fn new(url: &str, timeout_secs: u64) -> Result<Self, VaultsimError> {
        Ok(ContractMetadataAdapter {
            client: build_client(SOURCE_NAME, timeout_secs)?,
            base_url: base_url(url),
        })
    }
}

impl SymbolResolver for ContractMetadataAdapter {
    fn resolve_symbol(&self, asset_id: &str) -> Option<String> {
        let url = format!("{}/contract/{}", self.base_url, asset_id);
        match get_json(&self.client, SOURCE_NAME, &url, &[]) {
            Ok(body) => parse_symbol(&body),
            Err(e) => {
                debug!(asset_id, error = %e, "Symbol lookup failed");
                None
            }
        }
    }
}
