//! Quote API source (CoinGecko-compatible `market_chart/range`).

use reqwest::blocking::Client;

use super::{base_url, build_client, get_json};
use crate::domain::error::VaultsimError;
use crate::domain::price::{PricePoint, PriceSeries, PriceWindow};
use crate::ports::price_port::HistoricalPriceSource;

const SOURCE_NAME: &str = "quote_api";

/// Ticker to quote-API coin id.
const COIN_IDS: &[(&str, &str)] = &[
    ("XLM", "stellar"),
    ("USDC", "usd-coin"),
    ("USDT", "tether"),
    ("DAI", "dai"),
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("AQUA", "aquarius"),
    ("EURC", "euro-coin"),
    ("SOL", "solana"),
];

pub fn coin_id(asset_code: &str) -> Option<&'static str> {
    COIN_IDS
        .iter()
        .find(|(code, _)| code.eq_ignore_ascii_case(asset_code))
        .map(|(_, id)| *id)
}

/// Reads `{"prices": [[ms, price], ...]}`. Malformed pairs are skipped.
pub fn parse_market_chart(body: &serde_json::Value) -> Result<PriceSeries, VaultsimError> {
    let rows = body
        .get("prices")
        .and_then(|p| p.as_array())
        .ok_or_else(|| VaultsimError::price_source(SOURCE_NAME, "response has no prices array"))?;

    let points = rows
        .iter()
        .filter_map(|row| {
            let pair = row.as_array()?;
            let timestamp = pair.first()?.as_f64()? as i64;
            let price = pair.get(1)?.as_f64()?;
            Some(PricePoint { timestamp, price })
        })
        .collect();

    Ok(PriceSeries::from_unordered(points))
}

pub struct QuoteApiAdapter {
    client: Client,
    base_url: String,
}

impl QuoteApiAdapter {
    pub fn new(url: &str, timeout_secs: u64) -> Result<Self, VaultsimError> {
        Ok(QuoteApiAdapter {
            client: build_client(SOURCE_NAME, timeout_secs)?,
            base_url: base_url(url),
        })
    }
}

impl HistoricalPriceSource for QuoteApiAdapter {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    /// Quotes are always in USD; `counter_asset` is accepted for the trait
    /// but treated as a dollar stablecoin.
    fn fetch(
        &self,
        asset_code: &str,
        _counter_asset: &str,
        window: &PriceWindow,
    ) -> Result<PriceSeries, VaultsimError> {
        let id = coin_id(asset_code).ok_or_else(|| {
            VaultsimError::price_source(SOURCE_NAME, format!("no coin id known for {asset_code}"))
        })?;

        let url = format!("{}/coins/{}/market_chart/range", self.base_url, id);
        let query = [
            ("vs_currency", "usd".to_string()),
            ("from", (window.start / 1000).to_string()),
            ("to", (window.end / 1000).to_string()),
        ];
        let body = get_json(&self.client, SOURCE_NAME, &url, &query)?;
        parse_market_chart(&body)
    }
}
