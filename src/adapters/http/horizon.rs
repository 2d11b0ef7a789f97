//! Stellar Horizon `trade_aggregations` as a trade-history source.

use std::collections::HashMap;

use reqwest::blocking::Client;
use tracing::{debug, warn};

use super::{base_url, build_client, get_json};
use crate::domain::error::VaultsimError;
use crate::domain::price::{PricePoint, PriceSeries, PriceWindow};
use crate::ports::price_port::HistoricalPriceSource;

const SOURCE_NAME: &str = "horizon";
const MAX_RECORDS: usize = 200;
/// Upper bound on followed `next` links for one fetch.
const MAX_PAGES: usize = 100;

/// Bucket sizes Horizon accepts, in milliseconds.
pub const SUPPORTED_RESOLUTIONS: &[i64] = &[
    60_000,
    300_000,
    900_000,
    3_600_000,
    86_400_000,
    604_800_000,
];

/// Circle's USDC issuer on the public network.
pub const USDC_ISSUER: &str = "GA5ZSEJYB37JRC5AVCIA5MOP4RHTM335X2KGX3IHOJAPP5RE34K4KZVN";

/// Largest supported bucket not larger than `requested`; the smallest bucket
/// when `requested` is below all of them.
pub fn snap_resolution(requested: i64) -> i64 {
    SUPPORTED_RESOLUTIONS
        .iter()
        .copied()
        .filter(|r| *r <= requested)
        .max()
        .unwrap_or(SUPPORTED_RESOLUTIONS[0])
}

/// Reads `_embedded.records[]`, each with a `timestamp` (string or number)
/// and a string `close`.
pub fn parse_trade_aggregations(body: &serde_json::Value) -> Result<PriceSeries, VaultsimError> {
    let records = body
        .pointer("/_embedded/records")
        .and_then(|r| r.as_array())
        .ok_or_else(|| VaultsimError::price_source(SOURCE_NAME, "response has no records"))?;

    let points = records
        .iter()
        .filter_map(|record| {
            let ts = record.get("timestamp")?;
            let timestamp = ts
                .as_i64()
                .or_else(|| ts.as_str().and_then(|s| s.parse().ok()))?;
            let close = record.get("close")?;
            let price = close
                .as_f64()
                .or_else(|| close.as_str().and_then(|s| s.parse().ok()))?;
            Some(PricePoint { timestamp, price })
        })
        .collect();

    Ok(PriceSeries::from_unordered(points))
}

/// The `_links.next.href` cursor link of a page, if any.
pub fn next_page_link(body: &serde_json::Value) -> Option<String> {
    body.pointer("/_links/next/href")
        .and_then(|href| href.as_str())
        .filter(|href| !href.is_empty())
        .map(str::to_string)
}

pub struct HorizonAdapter {
    client: Client,
    base_url: String,
    native_asset: String,
    issuers: HashMap<String, String>,
}

impl HorizonAdapter {
    pub fn new(url: &str, native_asset: &str, timeout_secs: u64) -> Result<Self, VaultsimError> {
        let mut issuers = HashMap::new();
        issuers.insert("USDC".to_string(), USDC_ISSUER.to_string());
        Ok(HorizonAdapter {
            client: build_client(SOURCE_NAME, timeout_secs)?,
            base_url: base_url(url),
            native_asset: native_asset.to_string(),
            issuers,
        })
    }

    /// Registers the issuer used for a credit asset code.
    pub fn with_issuer(mut self, code: &str, issuer: &str) -> Self {
        self.issuers
            .insert(code.to_ascii_uppercase(), issuer.to_string());
        self
    }

    /// Query parameters describing one side of the pair.
    pub fn asset_params(
        &self,
        side: &str,
        code: &str,
    ) -> Result<Vec<(String, String)>, VaultsimError> {
        if code.eq_ignore_ascii_case(&self.native_asset) {
            return Ok(vec![(format!("{side}_asset_type"), "native".to_string())]);
        }
        let issuer = self
            .issuers
            .get(&code.to_ascii_uppercase())
            .ok_or_else(|| {
                VaultsimError::price_source(SOURCE_NAME, format!("no issuer known for {code}"))
            })?;
        let asset_type = if code.len() <= 4 {
            "credit_alphanum4"
        } else {
            "credit_alphanum12"
        };
        Ok(vec![
            (format!("{side}_asset_type"), asset_type.to_string()),
            (format!("{side}_asset_code"), code.to_ascii_uppercase()),
            (format!("{side}_asset_issuer"), issuer.clone()),
        ])
    }
}

impl HistoricalPriceSource for HorizonAdapter {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn fetch(
        &self,
        asset_code: &str,
        counter_asset: &str,
        window: &PriceWindow,
    ) -> Result<PriceSeries, VaultsimError> {
        let mut params = self.asset_params("base", asset_code)?;
        params.extend(self.asset_params("counter", counter_asset)?);

        let mut query: Vec<(&str, String)> =
            params.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        query.push(("start_time", window.start.to_string()));
        query.push(("end_time", window.end.to_string()));
        query.push(("resolution", snap_resolution(window.resolution).to_string()));
        query.push(("limit", MAX_RECORDS.to_string()));
        query.push(("order", "asc".to_string()));

        let url = format!("{}/trade_aggregations", self.base_url);
        let mut body = get_json(&self.client, SOURCE_NAME, &url, &query)?;
        let mut points = Vec::new();

        for page_number in 1..=MAX_PAGES {
            let page = parse_trade_aggregations(&body)?;
            let reached_end = page.len() < MAX_RECORDS
                || page.last().is_some_and(|p| p.timestamp >= window.end);
            points.extend_from_slice(page.points());
            if reached_end {
                break;
            }
            let Some(next) = next_page_link(&body) else {
                break;
            };
            if page_number == MAX_PAGES {
                warn!(pages = MAX_PAGES, "Stopping trade aggregation paging early");
                break;
            }
            debug!(page = page_number + 1, "Following trade aggregation cursor");
            body = get_json(&self.client, SOURCE_NAME, &next, &[])?;
        }

        Ok(PriceSeries::from_unordered(points))
    }
}
