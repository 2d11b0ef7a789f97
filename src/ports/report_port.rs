//! Report generation port.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::VaultsimError;

/// Port for writing backtest reports.
pub trait ReportPort {
    fn write(&self, result: &BacktestResult, output_path: &str) -> Result<(), VaultsimError>;
}
