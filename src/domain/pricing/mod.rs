//! Multi-source historical price acquisition.
//!
//! `PriceDataProvider` walks an ordered resolver chain per asset, resamples
//! the first successful series onto the run's fixed grid and, when every
//! real source fails, synthesizes a seeded random walk and flags the result.
//! A whole run never fails because one source is down.

pub mod cache;
pub mod resolvers;
pub mod synthetic;

use rand::Rng;
use tracing::{info, warn};

use crate::domain::error::VaultsimError;
use crate::domain::price::{PriceSeries, PriceWindow};
use crate::domain::vault::AssetAllocation;
use crate::ports::price_port::{HistoricalPriceSource, SymbolResolver};

use cache::PriceCache;
use resolvers::{PriceResolver, PriceSources, default_chain};

pub const DEFAULT_COUNTER_ASSET: &str = "USDC";
pub const DEFAULT_NATIVE_ASSET: &str = "XLM";
pub const DEFAULT_CACHE_TTL_SECS: i64 = 300;

type Source = Box<dyn HistoricalPriceSource + Send + Sync>;

/// Where an asset's series came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceOrigin {
    Resolved(&'static str),
    Cached,
    Synthetic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetPrices {
    pub asset_id: String,
    pub asset_code: String,
    pub series: PriceSeries,
    pub origin: PriceOrigin,
}

/// Grid-aligned series for every asset of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceData {
    pub assets: Vec<AssetPrices>,
    pub used_mock_data: bool,
    pub warning: Option<String>,
}

impl PriceData {
    pub fn series(&self, asset_id: &str) -> Option<&PriceSeries> {
        self.assets
            .iter()
            .find(|a| a.asset_id == asset_id)
            .map(|a| &a.series)
    }

    /// Nearest price for `asset_id` at `timestamp`.
    pub fn price_at(&self, asset_id: &str, timestamp: i64) -> Option<f64> {
        self.series(asset_id).and_then(|s| s.nearest(timestamp))
    }
}

pub struct PriceDataProvider {
    quote: Option<Source>,
    trade_history: Option<Source>,
    symbols: Option<Box<dyn SymbolResolver + Send + Sync>>,
    resolvers: Vec<Box<dyn PriceResolver + Send + Sync>>,
    cache: PriceCache,
    counter_asset: String,
    native_asset: String,
    mock_seed: Option<u64>,
}

impl Default for PriceDataProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceDataProvider {
    /// A provider with the default resolver chain and no external sources:
    /// stablecoins resolve, everything else falls back to synthetic data.
    pub fn new() -> Self {
        PriceDataProvider {
            quote: None,
            trade_history: None,
            symbols: None,
            resolvers: default_chain(),
            cache: PriceCache::new(DEFAULT_CACHE_TTL_SECS),
            counter_asset: DEFAULT_COUNTER_ASSET.to_string(),
            native_asset: DEFAULT_NATIVE_ASSET.to_string(),
            mock_seed: None,
        }
    }

    pub fn with_quote_source(mut self, source: Source) -> Self {
        self.quote = Some(source);
        self
    }

    pub fn with_trade_history(mut self, source: Source) -> Self {
        self.trade_history = Some(source);
        self
    }

    pub fn with_symbol_resolver(mut self, resolver: Box<dyn SymbolResolver + Send + Sync>) -> Self {
        self.symbols = Some(resolver);
        self
    }

    pub fn with_resolvers(mut self, resolvers: Vec<Box<dyn PriceResolver + Send + Sync>>) -> Self {
        self.resolvers = resolvers;
        self
    }

    pub fn with_cache(mut self, cache: PriceCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_counter_asset(mut self, counter_asset: &str) -> Self {
        self.counter_asset = counter_asset.to_string();
        self
    }

    pub fn with_native_asset(mut self, native_asset: &str) -> Self {
        self.native_asset = native_asset.to_string();
        self
    }

    /// Seeds the synthetic fallback so it is reproducible.
    pub fn with_mock_seed(mut self, seed: u64) -> Self {
        self.mock_seed = Some(seed);
        self
    }

    pub fn cache(&self) -> &PriceCache {
        &self.cache
    }

    fn sources(&self) -> PriceSources<'_> {
        PriceSources {
            quote: self
                .quote
                .as_deref()
                .map(|s| s as &dyn HistoricalPriceSource),
            trade_history: self
                .trade_history
                .as_deref()
                .map(|s| s as &dyn HistoricalPriceSource),
            symbols: self.symbols.as_deref().map(|s| s as &dyn SymbolResolver),
            counter_asset: &self.counter_asset,
            native_asset: &self.native_asset,
        }
    }

    /// Grid-aligned series for one asset, falling back to synthetic data.
    pub fn price_series(
        &self,
        asset: &AssetAllocation,
        window: &PriceWindow,
    ) -> Result<AssetPrices, VaultsimError> {
        let found = |series: PriceSeries, origin: PriceOrigin| AssetPrices {
            asset_id: asset.asset_id.clone(),
            asset_code: asset.asset_code.clone(),
            series,
            origin,
        };

        if let Some(series) = self.cache.get(&asset.asset_id, &self.counter_asset, window) {
            return Ok(found(series, PriceOrigin::Cached));
        }

        let sources = self.sources();
        for resolver in &self.resolvers {
            let Some(raw) = resolver.resolve(asset, window, &sources) else {
                continue;
            };
            match raw.resample(window) {
                Ok(series) => {
                    self.cache.insert(
                        &asset.asset_id,
                        &self.counter_asset,
                        window,
                        series.clone(),
                    );
                    return Ok(found(series, PriceOrigin::Resolved(resolver.name())));
                }
                Err(e) => {
                    warn!(resolver = resolver.name(), asset = %asset.asset_code, error = %e, "Discarding unusable series");
                }
            }
        }

        let seed = self.mock_seed.unwrap_or_else(|| rand::thread_rng().r#gen());
        warn!(asset = %asset.asset_code, seed, "No price source succeeded, using synthetic prices");
        let series = synthetic::random_walk(&asset.asset_code, window, seed)?;
        Ok(found(series, PriceOrigin::Synthetic))
    }

    /// Fetches every asset before the simulation starts. Assets are deduplicated
    /// by id, keeping first-seen order.
    pub fn fetch_all(
        &self,
        assets: &[AssetAllocation],
        window: &PriceWindow,
    ) -> Result<PriceData, VaultsimError> {
        let mut fetched: Vec<AssetPrices> = Vec::with_capacity(assets.len());
        for asset in assets {
            if fetched.iter().any(|a| a.asset_id == asset.asset_id) {
                continue;
            }
            fetched.push(self.price_series(asset, window)?);
        }

        let synthetic: Vec<&str> = fetched
            .iter()
            .filter(|a| a.origin == PriceOrigin::Synthetic)
            .map(|a| a.asset_code.as_str())
            .collect();
        let used_mock_data = !synthetic.is_empty();
        let warning = used_mock_data.then(|| {
            format!(
                "Historical price data was unavailable for {}; synthetic prices were used, so these results are illustrative only.",
                synthetic.join(", ")
            )
        });

        info!(
            assets = fetched.len(),
            synthetic = synthetic.len(),
            "Loaded historical prices"
        );

        Ok(PriceData {
            assets: fetched,
            used_mock_data,
            warning,
        })
    }
}
