//! JSON report adapter implementing ReportPort.
//!
//! Writes the complete `BacktestResult` as pretty-printed JSON, the same shape
//! the API layer returns as a response body. An output path of `-` writes to
//! stdout.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::VaultsimError;
use crate::ports::report_port::ReportPort;

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonReportAdapter;

impl JsonReportAdapter {
    pub fn new() -> Self {
        JsonReportAdapter
    }

    pub fn render(result: &BacktestResult) -> Result<String, VaultsimError> {
        Ok(serde_json::to_string_pretty(result)?)
    }
}

impl ReportPort for JsonReportAdapter {
    fn write(&self, result: &BacktestResult, output_path: &str) -> Result<(), VaultsimError> {
        let body = Self::render(result)?;
        if output_path == "-" {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(body.as_bytes())?;
            stdout.write_all(b"\n")?;
            return Ok(());
        }

        if let Some(parent) = Path::new(output_path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(output_path, body)?;
        Ok(())
    }
}
