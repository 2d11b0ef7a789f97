//! Local CSV price files as a historical price source.
//!
//! One file per pair, `{CODE}_{COUNTER}.csv`, with a `timestamp,price` header.
//! Timestamps are Unix milliseconds or ISO-8601 dates.

use crate::domain::backtest::parse_timestamp;
use crate::domain::error::VaultsimError;
use crate::domain::price::{PricePoint, PriceSeries, PriceWindow};
use crate::ports::price_port::HistoricalPriceSource;
use std::path::PathBuf;

const SOURCE_NAME: &str = "csv";

pub struct CsvPriceAdapter {
    base_path: PathBuf,
}

impl CsvPriceAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, code: &str, counter: &str) -> PathBuf {
        self.base_path.join(format!("{}_{}.csv", code, counter))
    }
}

fn parse_time(raw: &str) -> Result<i64, VaultsimError> {
    let raw = raw.trim();
    match raw.parse::<i64>() {
        Ok(ms) => Ok(ms),
        Err(_) => parse_timestamp("timestamp", raw)
            .map_err(|_| VaultsimError::price_source(SOURCE_NAME, format!("invalid timestamp '{raw}'"))),
    }
}

impl HistoricalPriceSource for CsvPriceAdapter {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    /// Rows within one resolution step of the window are kept so a coarse
    /// file still covers both ends of the grid.
    fn fetch(
        &self,
        asset_code: &str,
        counter_asset: &str,
        window: &PriceWindow,
    ) -> Result<PriceSeries, VaultsimError> {
        let path = self.csv_path(asset_code, counter_asset);
        let mut rdr = csv::Reader::from_path(&path).map_err(|e| {
            VaultsimError::price_source(
                SOURCE_NAME,
                format!("failed to read {}: {}", path.display(), e),
            )
        })?;

        let lower = window.start - window.resolution;
        let upper = window.end + window.resolution;
        let mut points = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| {
                VaultsimError::price_source(SOURCE_NAME, format!("CSV parse error: {}", e))
            })?;

            let time_str = record.get(0).ok_or_else(|| {
                VaultsimError::price_source(SOURCE_NAME, "missing timestamp column")
            })?;
            let timestamp = parse_time(time_str)?;
            if timestamp < lower || timestamp > upper {
                continue;
            }

            let price: f64 = record
                .get(1)
                .ok_or_else(|| VaultsimError::price_source(SOURCE_NAME, "missing price column"))?
                .trim()
                .parse()
                .map_err(|e| {
                    VaultsimError::price_source(SOURCE_NAME, format!("invalid price value: {}", e))
                })?;

            points.push(PricePoint { timestamp, price });
        }

        Ok(PriceSeries::from_unordered(points))
    }
}
