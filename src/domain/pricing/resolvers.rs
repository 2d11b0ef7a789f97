//! The ordered chain of price resolution strategies.
//!
//! Each resolver either declines an asset (`None`) or produces a raw,
//! not yet resampled series. Source errors are logged and swallowed here so
//! the chain can fall through to the next strategy.

use tracing::{debug, warn};

use crate::domain::price::{PriceSeries, PriceWindow};
use crate::domain::vault::AssetAllocation;
use crate::ports::price_port::{HistoricalPriceSource, SymbolResolver};

pub const STABLECOINS: &[&str] = &["USDC", "USDT", "DAI", "BUSD", "TUSD", "USDP", "PYUSD"];

/// Wrapper prefixes stripped when guessing a ticker for a contract token.
const WRAPPER_PREFIXES: &[&str] = &["ST", "Y", "W"];

pub fn is_stablecoin(code: &str) -> bool {
    STABLECOINS
        .iter()
        .any(|stable| stable.eq_ignore_ascii_case(code))
}

/// Soroban contract ids: 56 base32 characters starting with `C`.
pub fn is_contract_id(id: &str) -> bool {
    id.len() == 56
        && id.starts_with('C')
        && id
            .chars()
            .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c))
}

fn is_contract_asset(asset: &AssetAllocation) -> bool {
    is_contract_id(&asset.asset_id) || is_contract_id(&asset.asset_code)
}

/// Ticker guesses for a contract token, most specific first.
pub fn ticker_candidates(asset_code: &str) -> Vec<String> {
    if asset_code.is_empty() || is_contract_id(asset_code) {
        return Vec::new();
    }
    let upper = asset_code.to_ascii_uppercase();
    let mut candidates = vec![asset_code.to_string()];
    if upper != asset_code {
        candidates.push(upper.clone());
    }
    for prefix in WRAPPER_PREFIXES {
        if let Some(rest) = upper.strip_prefix(prefix) {
            if rest.len() >= 2 && !candidates.iter().any(|c| c == rest) {
                candidates.push(rest.to_string());
            }
        }
    }
    candidates
}

/// The collaborators a resolver may consult.
pub struct PriceSources<'a> {
    pub quote: Option<&'a dyn HistoricalPriceSource>,
    pub trade_history: Option<&'a dyn HistoricalPriceSource>,
    pub symbols: Option<&'a dyn SymbolResolver>,
    pub counter_asset: &'a str,
    pub native_asset: &'a str,
}

impl PriceSources<'_> {
    fn try_fetch(
        &self,
        source: Option<&dyn HistoricalPriceSource>,
        asset_code: &str,
        window: &PriceWindow,
    ) -> Option<PriceSeries> {
        let source = source?;
        match source.fetch(asset_code, self.counter_asset, window) {
            Ok(series) if !series.is_empty() && !series.covers(window) => {
                warn!(
                    source = source.name(),
                    asset = asset_code,
                    points = series.len(),
                    "Price source only partially covers the window, falling back"
                );
                None
            }
            Ok(series) if !series.is_empty() => {
                debug!(
                    source = source.name(),
                    asset = asset_code,
                    points = series.len(),
                    "Fetched historical prices"
                );
                Some(series)
            }
            Ok(_) => {
                warn!(
                    source = source.name(),
                    asset = asset_code,
                    "Price source returned no data points"
                );
                None
            }
            Err(e) => {
                warn!(
                    source = source.name(),
                    asset = asset_code,
                    error = %e,
                    "Price source failed, falling back"
                );
                None
            }
        }
    }

    pub fn quote(&self, asset_code: &str, window: &PriceWindow) -> Option<PriceSeries> {
        self.try_fetch(self.quote, asset_code, window)
    }

    pub fn trade_history(&self, asset_code: &str, window: &PriceWindow) -> Option<PriceSeries> {
        self.try_fetch(self.trade_history, asset_code, window)
    }

    fn is_native(&self, asset: &AssetAllocation) -> bool {
        asset.asset_code.eq_ignore_ascii_case(self.native_asset)
    }
}

pub trait PriceResolver {
    fn name(&self) -> &'static str;

    fn resolve(
        &self,
        asset: &AssetAllocation,
        window: &PriceWindow,
        sources: &PriceSources<'_>,
    ) -> Option<PriceSeries>;
}

/// Known dollar stablecoins price at a flat 1.00.
pub struct StablecoinResolver;

impl PriceResolver for StablecoinResolver {
    fn name(&self) -> &'static str {
        "stablecoin"
    }

    fn resolve(
        &self,
        asset: &AssetAllocation,
        window: &PriceWindow,
        _sources: &PriceSources<'_>,
    ) -> Option<PriceSeries> {
        is_stablecoin(&asset.asset_code).then(|| PriceSeries::constant(window, 1.0))
    }
}

/// Opaque contract identifiers: guess tickers, then ask the asset's own
/// metadata for a symbol and retry once.
pub struct ContractIdResolver;

impl PriceResolver for ContractIdResolver {
    fn name(&self) -> &'static str {
        "contract-id"
    }

    fn resolve(
        &self,
        asset: &AssetAllocation,
        window: &PriceWindow,
        sources: &PriceSources<'_>,
    ) -> Option<PriceSeries> {
        if !is_contract_asset(asset) {
            return None;
        }

        for candidate in ticker_candidates(&asset.asset_code) {
            if let Some(series) = sources.quote(&candidate, window) {
                return Some(series);
            }
        }

        let symbol = sources
            .symbols
            .and_then(|resolver| resolver.resolve_symbol(&asset.asset_id))?;
        debug!(asset_id = %asset.asset_id, symbol = %symbol, "Resolved contract symbol");
        if is_stablecoin(&symbol) {
            return Some(PriceSeries::constant(window, 1.0));
        }
        sources.quote(&symbol, window)
    }
}

/// The chain's native asset: trade history first, quote source second.
pub struct NativeAssetResolver;

impl PriceResolver for NativeAssetResolver {
    fn name(&self) -> &'static str {
        "native"
    }

    fn resolve(
        &self,
        asset: &AssetAllocation,
        window: &PriceWindow,
        sources: &PriceSources<'_>,
    ) -> Option<PriceSeries> {
        if !sources.is_native(asset) || is_contract_asset(asset) {
            return None;
        }
        sources
            .trade_history(&asset.asset_code, window)
            .or_else(|| sources.quote(&asset.asset_code, window))
    }
}

/// Everything else: quote source by ticker, trade history second.
pub struct TickerResolver;

impl PriceResolver for TickerResolver {
    fn name(&self) -> &'static str {
        "ticker"
    }

    fn resolve(
        &self,
        asset: &AssetAllocation,
        window: &PriceWindow,
        sources: &PriceSources<'_>,
    ) -> Option<PriceSeries> {
        if sources.is_native(asset) || is_contract_asset(asset) {
            return None;
        }
        sources
            .quote(&asset.asset_code, window)
            .or_else(|| sources.trade_history(&asset.asset_code, window))
    }
}

/// Resolution order: stablecoin, contract id, native asset, ticker.
pub fn default_chain() -> Vec<Box<dyn PriceResolver + Send + Sync>> {
    vec![
        Box::new(StablecoinResolver),
        Box::new(ContractIdResolver),
        Box::new(NativeAssetResolver),
        Box::new(TickerResolver),
    ]
}
