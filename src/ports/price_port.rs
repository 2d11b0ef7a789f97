//! Historical price lookup ports.

use crate::domain::error::VaultsimError;
use crate::domain::price::{PriceSeries, PriceWindow};

/// A source of historical prices for an asset quoted in `counter_asset`.
pub trait HistoricalPriceSource {
    /// Short name used in logs and error messages.
    fn name(&self) -> &'static str;

    fn fetch(
        &self,
        asset_code: &str,
        counter_asset: &str,
        window: &PriceWindow,
    ) -> Result<PriceSeries, VaultsimError>;
}

/// Best-effort lookup of a ticker symbol for an opaque asset identifier.
pub trait SymbolResolver {
    fn resolve_symbol(&self, asset_id: &str) -> Option<String>;
}
