//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::warn;

use crate::adapters::csv_adapter::CsvPriceAdapter;
use crate::adapters::failover_source::FailoverSource;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::domain::backtest::{
    self as backtest_engine, BacktestConfig, BacktestRequest, parse_timestamp,
};
use crate::domain::config_validation::EngineSettings;
use crate::domain::error::VaultsimError;
use crate::domain::metrics::BacktestMetrics;
use crate::domain::price::{PricePoint, PriceWindow};
use crate::domain::pricing::cache::PriceCache;
use crate::domain::pricing::{PriceDataProvider, PriceOrigin};
use crate::domain::vault::AssetAllocation;
use crate::ports::price_port::HistoricalPriceSource;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "vaultsim", about = "Vault rebalancing strategy backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest from a JSON request
    Backtest {
        #[arg(short, long)]
        request: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Report path; `-` or absent writes to stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Seed for the synthetic price fallback
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Validate a backtest request without fetching prices
    Validate {
        #[arg(short, long)]
        request: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the resolved price series for one asset as CSV
    Prices {
        #[arg(long)]
        asset: String,
        #[arg(long)]
        asset_id: Option<String>,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        /// Grid step in milliseconds
        #[arg(long, default_value_t = backtest_engine::DEFAULT_RESOLUTION_MS)]
        resolution: i64,
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        seed: Option<u64>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let outcome = match cli.command {
        Command::Backtest {
            request,
            config,
            output,
            seed,
        } => run_backtest(&request, config.as_ref(), output.as_ref(), seed),
        Command::Validate { request, config } => run_validate(&request, config.as_ref()),
        Command::Prices {
            asset,
            asset_id,
            start,
            end,
            resolution,
            config,
            seed,
        } => run_prices(
            &asset,
            asset_id.as_deref(),
            &start,
            &end,
            resolution,
            config.as_ref(),
            seed,
        ),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Settings from `path`, or the defaults when no file is given.
pub fn load_settings(path: Option<&PathBuf>) -> Result<EngineSettings, VaultsimError> {
    match path {
        Some(path) => {
            eprintln!("Loading settings from {}", path.display());
            let adapter = FileConfigAdapter::from_file(path)?;
            EngineSettings::from_config(&adapter)
        }
        None => Ok(EngineSettings::default()),
    }
}

pub fn load_request(path: &Path) -> Result<BacktestRequest, VaultsimError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Wires the configured sources into a provider. A CSV directory, when set,
/// is consulted before any network source in both resolver slots.
pub fn build_price_provider(
    settings: &EngineSettings,
    seed_override: Option<u64>,
) -> Result<PriceDataProvider, VaultsimError> {
    let csv = || -> Option<Box<dyn HistoricalPriceSource + Send + Sync>> {
        let dir = settings.csv_dir.clone()?;
        Some(Box::new(CsvPriceAdapter::new(dir)))
    };

    let mut quote = FailoverSource::new("quote");
    let mut trade_history = FailoverSource::new("trade_history");
    if let Some(source) = csv() {
        quote = quote.push(source);
    }
    if let Some(source) = csv() {
        trade_history = trade_history.push(source);
    }

    let mut provider = PriceDataProvider::new()
        .with_cache(PriceCache::new(settings.cache_ttl_secs))
        .with_counter_asset(&settings.counter_asset)
        .with_native_asset(&settings.native_asset);

    if settings.offline {
        eprintln!("Offline mode: network price sources disabled");
    } else {
        #[cfg(feature = "http")]
        {
            use crate::adapters::http::{ContractMetadataAdapter, HorizonAdapter, QuoteApiAdapter};

            let timeout = settings.request_timeout_secs;
            quote = quote.push(Box::new(QuoteApiAdapter::new(
                &settings.quote_api_url,
                timeout,
            )?));
            trade_history = trade_history.push(Box::new(HorizonAdapter::new(
                &settings.horizon_url,
                &settings.native_asset,
                timeout,
            )?));
            provider = provider.with_symbol_resolver(Box::new(ContractMetadataAdapter::new(
                &settings.metadata_url,
                timeout,
            )?));
        }

        #[cfg(not(feature = "http"))]
        warn!("Built without the http feature; only local price sources are available");
    }

    if let Some(source) = quote.into_source() {
        provider = provider.with_quote_source(source);
    }
    if let Some(source) = trade_history.into_source() {
        provider = provider.with_trade_history(source);
    }
    if let Some(seed) = seed_override.or(settings.mock_seed) {
        provider = provider.with_mock_seed(seed);
    }
    Ok(provider)
}

fn run_backtest(
    request_path: &Path,
    config_path: Option<&PathBuf>,
    output_path: Option<&PathBuf>,
    seed: Option<u64>,
) -> Result<(), VaultsimError> {
    let settings = load_settings(config_path)?;

    eprintln!("Loading request from {}", request_path.display());
    let mut request = load_request(request_path)?;
    if request.risk_free_rate.is_none() {
        request.risk_free_rate = Some(settings.risk_free_rate);
    }
    if request.initial_holdings.is_none() {
        request.initial_holdings = Some(settings.initial_holdings);
    }

    let provider = build_price_provider(&settings, seed)?;
    eprintln!(
        "Running backtest: {} assets, {} rules, {} to {}",
        request.vault_config.assets.len(),
        request.vault_config.rules.len(),
        request.start_time,
        request.end_time,
    );
    let result = backtest_engine::run_backtest(&request, &provider)?;

    print_summary(&result.metrics);

    let output = output_path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string());
    JsonReportAdapter::new().write(&result, &output)?;
    if output != "-" {
        eprintln!("\nReport written to: {output}");
    }
    Ok(())
}

pub fn print_summary(metrics: &BacktestMetrics) {
    eprintln!("\n=== Backtest Results ===");
    eprintln!("Initial Capital:  {:.2}", metrics.initial_capital);
    eprintln!("Final Value:      {:.2}", metrics.final_value);
    eprintln!("Total Return:     {:.2}%", metrics.total_return);
    eprintln!("Annualized:       {:.2}%", metrics.annualized_return);
    eprintln!("Volatility:       {:.2}%", metrics.volatility);
    eprintln!("Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", metrics.sortino_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", metrics.max_drawdown);
    eprintln!("Win Rate:         {:.1}%", metrics.win_rate);
    eprintln!("Profit Factor:    {:.2}", metrics.profit_factor);
    eprintln!("Buy & Hold:       {:.2}%", metrics.buy_and_hold_return);
    eprintln!("Rebalances:       {}", metrics.num_rebalances);
    eprintln!("Total Fees:       {:.2}", metrics.total_fees);
    if let Some(warning) = &metrics.data_warning {
        eprintln!("\nwarning: {warning}");
    }
}

fn run_validate(request_path: &Path, config_path: Option<&PathBuf>) -> Result<(), VaultsimError> {
    if config_path.is_some() {
        load_settings(config_path)?;
        eprintln!("Settings OK");
    }

    let request = load_request(request_path)?;
    let config = BacktestConfig::from_request(&request)?;

    let vault = &request.vault_config;
    let enabled = vault.rules.iter().filter(|r| r.enabled).count();
    let allocated: f64 = vault.assets.iter().map(|a| a.percentage).sum();

    eprintln!("Request is valid");
    eprintln!("  Assets:         {}", vault.assets.len());
    eprintln!("  Rules:          {} ({} enabled)", vault.rules.len(), enabled);
    eprintln!("  Ticks:          {}", config.window().tick_count());
    eprintln!("  Management Fee: {}%", config.management_fee_pct);
    if (allocated - 100.0).abs() > 1e-6 {
        eprintln!("warning: vault allocations sum to {allocated}%, not 100%");
    }
    for rule in &vault.rules {
        for action in &rule.actions {
            let total: f64 = action.target_allocations.iter().map(|a| a.percentage).sum();
            if !action.target_allocations.is_empty() && (total - 100.0).abs() > 1e-6 {
                eprintln!("warning: rule {} targets sum to {total}%, not 100%", rule.id);
            }
        }
    }
    Ok(())
}

fn run_prices(
    asset_code: &str,
    asset_id: Option<&str>,
    start: &str,
    end: &str,
    resolution: i64,
    config_path: Option<&PathBuf>,
    seed: Option<u64>,
) -> Result<(), VaultsimError> {
    let start_ms = parse_timestamp("start", start)?;
    let end_ms = parse_timestamp("end", end)?;
    if end_ms <= start_ms {
        return Err(VaultsimError::invalid_request("end", "must be after start"));
    }
    if resolution <= 0 {
        return Err(VaultsimError::invalid_request("resolution", "must be positive"));
    }

    let settings = load_settings(config_path)?;
    let provider = build_price_provider(&settings, seed)?;
    let asset = AssetAllocation::new(asset_id.unwrap_or(asset_code), asset_code, 100.0);
    let window = PriceWindow::new(start_ms, end_ms, resolution);

    let prices = provider.price_series(&asset, &window)?;
    match prices.origin {
        PriceOrigin::Resolved(name) => eprintln!("Resolved {} via {}", asset_code, name),
        PriceOrigin::Cached => eprintln!("Resolved {} from cache", asset_code),
        PriceOrigin::Synthetic => {
            warn!(asset = asset_code, "Printing synthetic prices");
            eprintln!("warning: no source had data for {asset_code}; prices are synthetic");
        }
    }

    write_price_csv(std::io::stdout().lock(), prices.series.points())
}

/// Writes `timestamp,price` rows with a header.
pub fn write_price_csv<W: std::io::Write>(
    writer: W,
    points: &[PricePoint],
) -> Result<(), VaultsimError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for point in points {
        wtr.serialize(point)?;
    }
    wtr.flush()?;
    Ok(())
}
