//! Ordered failover across several historical price sources.
//!
//! Lets a local CSV directory shadow a network source in the same resolver
//! slot: the first source returning a non-empty series wins.

use tracing::warn;

use crate::domain::error::VaultsimError;
use crate::domain::price::{PriceSeries, PriceWindow};
use crate::ports::price_port::HistoricalPriceSource;

type Source = Box<dyn HistoricalPriceSource + Send + Sync>;

pub struct FailoverSource {
    name: &'static str,
    sources: Vec<Source>,
}

impl FailoverSource {
    pub fn new(name: &'static str) -> Self {
        FailoverSource {
            name,
            sources: Vec::new(),
        }
    }

    pub fn push(mut self, source: Source) -> Self {
        self.sources.push(source);
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// The single source itself when there is only one, so logs name it.
    pub fn into_source(mut self) -> Option<Source> {
        match self.sources.len() {
            0 => None,
            1 => self.sources.pop(),
            _ => Some(Box::new(self)),
        }
    }
}

impl HistoricalPriceSource for FailoverSource {
    fn name(&self) -> &'static str {
        self.name
    }

    fn fetch(
        &self,
        asset_code: &str,
        counter_asset: &str,
        window: &PriceWindow,
    ) -> Result<PriceSeries, VaultsimError> {
        let mut last_error = None;
        for source in &self.sources {
            match source.fetch(asset_code, counter_asset, window) {
                Ok(series) if !series.is_empty() => return Ok(series),
                Ok(_) => {
                    last_error = Some(VaultsimError::price_source(
                        source.name(),
                        format!("no data for {asset_code}"),
                    ));
                }
                Err(e) => {
                    warn!(source = source.name(), asset = asset_code, error = %e, "Source failed, trying next");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| VaultsimError::price_source(self.name, "no sources configured")))
    }
}
