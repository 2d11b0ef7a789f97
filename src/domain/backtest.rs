//! Backtest request, validation and the time-stepped simulation loop.
//!
//! `run_backtest` fetches every price series up front, then replays the vault's
//! rules tick by tick on a fixed grid. The loop is single-threaded and
//! deterministic; any error aborts the whole run and no partial result is
//! returned.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::error::VaultsimError;
use super::execution::{ExecutionOutcome, RebalanceExecutor};
use super::metrics::{BacktestMetrics, MetricsInput, ValuePoint};
use super::portfolio::{AllocationSnapshot, Holdings, PortfolioState};
use super::price::{MS_PER_DAY, PriceWindow};
use super::pricing::{PriceData, PriceDataProvider};
use super::rule_eval::{RuleEvaluator, TickContext};
use super::vault::{AssetAllocation, VaultConfig};

pub const DEFAULT_RESOLUTION_MS: i64 = MS_PER_DAY;
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.02;

/// How the opening holdings are derived from the target allocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialHoldings {
    /// `amount = capital * pct / 100`: every asset is taken at a price of 1.
    #[default]
    UnitPrice,
    /// `amount = capital * pct / 100 / price` at the first tick's price.
    MarketPrice,
}

impl std::str::FromStr for InitialHoldings {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unit_price" => Ok(InitialHoldings::UnitPrice),
            "market_price" => Ok(InitialHoldings::MarketPrice),
            other => Err(format!("unknown initial holdings mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestRequest {
    pub vault_config: VaultConfig,
    pub start_time: String,
    pub end_time: String,
    pub initial_capital: f64,
    /// Tick size in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<i64>,
    /// Annual rate as a fraction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_free_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_holdings: Option<InitialHoldings>,
}

/// A request that passed validation, with parsed timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub start: i64,
    pub end: i64,
    pub resolution: i64,
    pub initial_capital: f64,
    pub risk_free_rate: f64,
    pub management_fee_pct: f64,
    pub initial_holdings: InitialHoldings,
}

/// Parses an ISO-8601 instant into Unix milliseconds. Accepts RFC 3339, a
/// zone-less date-time (read as UTC) or a plain date at midnight UTC.
pub fn parse_timestamp(field: &str, value: &str) -> Result<i64, VaultsimError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.timestamp_millis());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(dt.and_utc().timestamp_millis());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
        .ok_or_else(|| {
            VaultsimError::invalid_request(field, format!("'{value}' is not an ISO-8601 date"))
        })
}

/// Holdings are keyed by asset id, so a repeated id would overwrite an
/// earlier entry and silently drop its share of the capital.
fn check_unique_ids(field: &str, allocations: &[AssetAllocation]) -> Result<(), VaultsimError> {
    for (i, allocation) in allocations.iter().enumerate() {
        if allocations[..i].iter().any(|a| a.asset_id == allocation.asset_id) {
            return Err(VaultsimError::invalid_request(
                field,
                format!("asset {} is listed more than once", allocation.asset_id),
            ));
        }
    }
    Ok(())
}

fn check_percentage(field: &str, allocation: &AssetAllocation) -> Result<(), VaultsimError> {
    let pct = allocation.percentage;
    if !pct.is_finite() || !(0.0..=100.0).contains(&pct) {
        return Err(VaultsimError::invalid_request(
            field,
            format!(
                "percentage for {} must be between 0 and 100, got {pct}",
                allocation.asset_id
            ),
        ));
    }
    Ok(())
}

impl BacktestConfig {
    pub fn from_request(request: &BacktestRequest) -> Result<Self, VaultsimError> {
        let start = parse_timestamp("startTime", &request.start_time)?;
        let end = parse_timestamp("endTime", &request.end_time)?;
        if end <= start {
            return Err(VaultsimError::invalid_request(
                "endTime",
                "must be after startTime",
            ));
        }

        let capital = request.initial_capital;
        if !capital.is_finite() || capital <= 0.0 {
            return Err(VaultsimError::invalid_request(
                "initialCapital",
                format!("must be a positive number, got {capital}"),
            ));
        }

        let resolution = request.resolution.unwrap_or(DEFAULT_RESOLUTION_MS);
        if resolution <= 0 {
            return Err(VaultsimError::invalid_request(
                "resolution",
                format!("must be positive, got {resolution}"),
            ));
        }

        let risk_free_rate = request.risk_free_rate.unwrap_or(DEFAULT_RISK_FREE_RATE);
        if !risk_free_rate.is_finite() {
            return Err(VaultsimError::invalid_request(
                "riskFreeRate",
                "must be a finite number",
            ));
        }

        let vault = &request.vault_config;
        if vault.assets.is_empty() {
            return Err(VaultsimError::EmptyDataset {
                reason: "vault has no assets".into(),
            });
        }
        check_unique_ids("vaultConfig.assets", &vault.assets)?;
        for asset in &vault.assets {
            check_percentage("vaultConfig.assets", asset)?;
        }
        for rule in &vault.rules {
            for action in &rule.actions {
                check_unique_ids(
                    "vaultConfig.rules.actions.targetAllocations",
                    &action.target_allocations,
                )?;
                for target in &action.target_allocations {
                    check_percentage("vaultConfig.rules.actions.targetAllocations", target)?;
                }
            }
        }

        let management_fee_pct = vault.management_fee_pct();
        if !management_fee_pct.is_finite() || !(0.0..=100.0).contains(&management_fee_pct) {
            return Err(VaultsimError::invalid_request(
                "vaultConfig.managementFee",
                format!("must be between 0 and 100, got {management_fee_pct}"),
            ));
        }

        Ok(BacktestConfig {
            start,
            end,
            resolution,
            initial_capital: capital,
            risk_free_rate,
            management_fee_pct,
            initial_holdings: request.initial_holdings.unwrap_or_default(),
        })
    }

    pub fn window(&self) -> PriceWindow {
        PriceWindow::new(self.start, self.end, self.resolution)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Deposit,
    Withdraw,
    Rebalance,
    Fee,
}

/// One ledger entry of the simulated vault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestTransaction {
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub portfolio_value: f64,
    pub allocations: Vec<AllocationSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_rule: Option<String>,
    /// Deposited capital or fee charged; absent for rebalances.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    pub cumulative_fees: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationPoint {
    pub timestamp: i64,
    pub allocations: Vec<AllocationSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestResult {
    pub request: BacktestRequest,
    pub metrics: BacktestMetrics,
    pub timeline: Vec<BacktestTransaction>,
    pub portfolio_value_history: Vec<ValuePoint>,
    pub allocation_history: Vec<AllocationPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationState {
    Running,
    Completed,
}

/// Histories collected by a finished simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationRecord {
    pub timeline: Vec<BacktestTransaction>,
    pub value_history: Vec<ValuePoint>,
    pub allocation_history: Vec<AllocationPoint>,
    pub num_rebalances: usize,
    pub total_fees: f64,
}

/// One run over pre-fetched prices. Owns its portfolio exclusively.
pub struct Simulation<'a> {
    config: &'a BacktestConfig,
    vault: &'a VaultConfig,
    prices: &'a PriceData,
    state: SimulationState,
    portfolio: PortfolioState,
    evaluator: RuleEvaluator,
    executor: RebalanceExecutor,
    record: SimulationRecord,
}

impl<'a> Simulation<'a> {
    /// Opens the vault's target allocation and records the initial deposit.
    /// Every vault asset needs a usable first-tick price either way; the
    /// holdings mode only decides whether that price divides the amount.
    pub fn new(
        config: &'a BacktestConfig,
        vault: &'a VaultConfig,
        prices: &'a PriceData,
    ) -> Result<Self, VaultsimError> {
        if prices.assets.is_empty() {
            return Err(VaultsimError::EmptyDataset {
                reason: "no price series were loaded".into(),
            });
        }

        let start = config.start;
        let mut holdings = Holdings::new();
        for asset in &vault.assets {
            let price = prices
                .price_at(&asset.asset_id, start)
                .filter(|p| p.is_finite() && *p > 0.0)
                .ok_or_else(|| VaultsimError::MissingPrice {
                    asset_id: asset.asset_id.clone(),
                    timestamp: start,
                })?;
            let share = config.initial_capital * asset.percentage / 100.0;
            let amount = match config.initial_holdings {
                InitialHoldings::UnitPrice => share,
                InitialHoldings::MarketPrice => share / price,
            };
            holdings.set(&asset.asset_id, amount);
        }

        let mut portfolio = PortfolioState::new(holdings);
        portfolio.revalue(|id| prices.price_at(id, start));

        let deposit = BacktestTransaction {
            timestamp: start,
            transaction_type: TransactionType::Deposit,
            portfolio_value: portfolio.total_value,
            allocations: portfolio.allocations.clone(),
            triggered_rule: None,
            amount: Some(config.initial_capital),
            cumulative_fees: 0.0,
        };

        Ok(Simulation {
            config,
            vault,
            prices,
            state: SimulationState::Running,
            portfolio,
            evaluator: RuleEvaluator::new(),
            executor: RebalanceExecutor::new(config.management_fee_pct),
            record: SimulationRecord {
                timeline: vec![deposit],
                value_history: Vec::new(),
                allocation_history: Vec::new(),
                num_rebalances: 0,
                total_fees: 0.0,
            },
        })
    }

    pub fn state(&self) -> SimulationState {
        self.state
    }

    pub fn portfolio(&self) -> &PortfolioState {
        &self.portfolio
    }

    /// Revalues, applies every triggered rule in priority order and appends
    /// the tick's snapshot.
    pub fn step(&mut self, tick: i64) -> Result<(), VaultsimError> {
        let prices = self.prices;
        let vault = self.vault;
        let price_of = |id: &str| prices.price_at(id, tick);

        self.portfolio.revalue(price_of);

        let triggered = {
            let ctx = TickContext {
                timestamp: tick,
                portfolio: &self.portfolio,
                price_of,
            };
            self.evaluator.triggered(&vault.rules, &ctx)
        };

        for rule in triggered {
            self.evaluator.mark_triggered(&rule.id, tick);
            let Some(action) = rule.actions.first() else {
                continue;
            };

            match self
                .executor
                .apply(&mut self.portfolio, action, price_of, tick)?
            {
                ExecutionOutcome::Rebalanced { fee, .. } => {
                    self.push_entry(tick, TransactionType::Rebalance, Some(rule.id.as_str()), None);
                    if fee > 0.0 {
                        self.push_entry(tick, TransactionType::Fee, Some(rule.id.as_str()), Some(fee));
                    }
                }
                ExecutionOutcome::Skipped {
                    action_type,
                    reason,
                } => {
                    debug!(rule = %rule.id, ?action_type, reason, "Action not simulated");
                }
            }
        }

        self.record.value_history.push(ValuePoint {
            timestamp: tick,
            value: self.portfolio.total_value,
        });
        self.record.allocation_history.push(AllocationPoint {
            timestamp: tick,
            allocations: self.portfolio.allocations.clone(),
        });
        Ok(())
    }

    fn push_entry(
        &mut self,
        tick: i64,
        transaction_type: TransactionType,
        rule_id: Option<&str>,
        amount: Option<f64>,
    ) {
        self.record.timeline.push(BacktestTransaction {
            timestamp: tick,
            transaction_type,
            portfolio_value: self.portfolio.total_value,
            allocations: self.portfolio.allocations.clone(),
            triggered_rule: rule_id.map(str::to_string),
            amount,
            cumulative_fees: self.executor.total_fees,
        });
    }

    /// Steps through every tick of the window and completes the run. A
    /// completed simulation is not replayed.
    pub fn run(&mut self) -> Result<(), VaultsimError> {
        if self.state == SimulationState::Completed {
            return Ok(());
        }
        let window = self.config.window();
        for tick in window.ticks() {
            self.step(tick)?;
        }
        self.state = SimulationState::Completed;
        self.record.num_rebalances = self.executor.num_rebalances;
        self.record.total_fees = self.executor.total_fees;
        Ok(())
    }

    pub fn into_record(self) -> SimulationRecord {
        self.record
    }
}

/// Vault assets followed by any asset only named in a rule target, by id in
/// first-seen order.
pub fn assets_to_price(vault: &VaultConfig) -> Vec<AssetAllocation> {
    let mut assets: Vec<AssetAllocation> = Vec::new();
    let targets = vault
        .rules
        .iter()
        .flat_map(|r| r.actions.iter())
        .flat_map(|a| a.target_allocations.iter());
    for asset in vault.assets.iter().chain(targets) {
        if !assets.iter().any(|a| a.asset_id == asset.asset_id) {
            assets.push(asset.clone());
        }
    }
    assets
}

/// Runs one complete backtest. Only the price fetch touches the outside
/// world; everything after it is a pure function of the fetched data.
pub fn run_backtest(
    request: &BacktestRequest,
    provider: &PriceDataProvider,
) -> Result<BacktestResult, VaultsimError> {
    let config = BacktestConfig::from_request(request)?;
    let vault = &request.vault_config;
    let window = config.window();

    info!(
        start = %request.start_time,
        end = %request.end_time,
        ticks = window.tick_count(),
        rules = vault.rules.len(),
        "Starting backtest"
    );

    let prices = provider.fetch_all(&assets_to_price(vault), &window)?;
    let mut simulation = Simulation::new(&config, vault, &prices)?;
    simulation.run()?;
    let record = simulation.into_record();

    let price_at = |id: &str, ts: i64| prices.price_at(id, ts);
    let metrics = BacktestMetrics::compute(&MetricsInput {
        initial_capital: config.initial_capital,
        start: config.start,
        end: config.end,
        values: &record.value_history,
        initial_targets: &vault.assets,
        price_at: &price_at,
        risk_free_rate: config.risk_free_rate,
        num_rebalances: record.num_rebalances,
        total_fees: record.total_fees,
        used_mock_data: prices.used_mock_data,
        data_warning: prices.warning.clone(),
    });

    info!(
        final_value = metrics.final_value,
        total_return = metrics.total_return,
        rebalances = metrics.num_rebalances,
        used_mock_data = metrics.used_mock_data,
        "Backtest complete"
    );

    Ok(BacktestResult {
        request: request.clone(),
        metrics,
        timeline: record.timeline,
        portfolio_value_history: record.value_history,
        allocation_history: record.allocation_history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::price::{PricePoint, PriceSeries};
    use crate::domain::pricing::{AssetPrices, PriceOrigin};
    use crate::domain::vault::{
        ActionType, ComparisonOperator, ConditionType, RebalanceAction, RebalanceCondition,
        RebalanceRule,
    };

    const START: &str = "2024-01-01T00:00:00Z";

    fn vault(assets: &[(&str, f64)]) -> VaultConfig {
        VaultConfig {
            assets: assets
                .iter()
                .map(|(id, pct)| AssetAllocation::new(id, id, *pct))
                .collect(),
            rules: vec![],
            management_fee: None,
        }
    }

    fn request(vault_config: VaultConfig, end: &str) -> BacktestRequest {
        BacktestRequest {
            vault_config,
            start_time: START.into(),
            end_time: end.into(),
            initial_capital: 10_000.0,
            resolution: None,
            risk_free_rate: None,
            initial_holdings: None,
        }
    }

    fn rebalance_rule(id: &str, priority: i32, targets: &[(&str, f64)]) -> RebalanceRule {
        RebalanceRule {
            id: id.into(),
            name: id.into(),
            conditions: vec![RebalanceCondition {
                condition_type: ConditionType::Time,
                operator: ComparisonOperator::Gte,
                value: (7 * MS_PER_DAY) as f64,
                asset_id: None,
            }],
            actions: vec![RebalanceAction {
                action_type: ActionType::Rebalance,
                target_allocations: targets
                    .iter()
                    .map(|(id, pct)| AssetAllocation::new(id, id, *pct))
                    .collect(),
                params: None,
            }],
            enabled: true,
            priority,
        }
    }

    /// Grid-aligned series for `ids`, priced by `f(asset_id, day_index)`.
    fn price_data(config: &BacktestConfig, ids: &[&str], f: fn(&str, i64) -> f64) -> PriceData {
        let window = config.window();
        PriceData {
            assets: ids
                .iter()
                .map(|id| AssetPrices {
                    asset_id: id.to_string(),
                    asset_code: id.to_string(),
                    series: PriceSeries::new(
                        window
                            .ticks()
                            .map(|t| PricePoint {
                                timestamp: t,
                                price: f(id, (t - config.start) / MS_PER_DAY),
                            })
                            .collect(),
                    )
                    .unwrap(),
                    origin: PriceOrigin::Resolved("test"),
                })
                .collect(),
            used_mock_data: false,
            warning: None,
        }
    }

    #[test]
    fn parse_timestamp_formats() {
        let rfc = parse_timestamp("t", "2024-01-01T00:00:00Z").unwrap();
        let offset = parse_timestamp("t", "2024-01-01T02:00:00+02:00").unwrap();
        let naive = parse_timestamp("t", "2024-01-01T00:00:00").unwrap();
        let date = parse_timestamp("t", "2024-01-01").unwrap();

        assert_eq!(rfc, 1_704_067_200_000);
        assert_eq!(offset, rfc);
        assert_eq!(naive, rfc);
        assert_eq!(date, rfc);
        assert!(matches!(
            parse_timestamp("startTime", "yesterday"),
            Err(VaultsimError::InvalidRequest { ref field, .. }) if field == "startTime"
        ));
    }

    #[test]
    fn config_from_valid_request() {
        let req = request(vault(&[("USDC", 100.0)]), "2024-01-31");
        let config = BacktestConfig::from_request(&req).unwrap();

        assert_eq!(config.end - config.start, 30 * MS_PER_DAY);
        assert_eq!(config.resolution, DEFAULT_RESOLUTION_MS);
        assert!((config.risk_free_rate - DEFAULT_RISK_FREE_RATE).abs() < f64::EPSILON);
        assert_eq!(config.management_fee_pct, 0.0);
        assert_eq!(config.window().tick_count(), 31);
    }

    #[test]
    fn config_rejects_bad_requests() {
        let base = request(vault(&[("USDC", 100.0)]), "2024-01-31");

        let mut reversed = base.clone();
        reversed.end_time = "2023-12-01".into();
        let mut equal = base.clone();
        equal.end_time = START.into();
        let mut broke = base.clone();
        broke.initial_capital = 0.0;
        let mut nan = base.clone();
        nan.initial_capital = f64::NAN;
        let mut zero_res = base.clone();
        zero_res.resolution = Some(0);
        let mut bad_pct = base.clone();
        bad_pct.vault_config.assets[0].percentage = 120.0;
        let mut bad_fee = base.clone();
        bad_fee.vault_config.management_fee = Some(-1.0);

        for bad in [reversed, equal, broke, nan, zero_res, bad_pct, bad_fee] {
            assert!(matches!(
                BacktestConfig::from_request(&bad),
                Err(VaultsimError::InvalidRequest { .. })
            ));
        }

        let empty = request(vault(&[]), "2024-01-31");
        assert!(matches!(
            BacktestConfig::from_request(&empty),
            Err(VaultsimError::EmptyDataset { .. })
        ));
    }

    #[test]
    fn assets_include_rule_targets_once() {
        let mut v = vault(&[("XLM", 60.0), ("USDC", 40.0)]);
        v.rules.push(rebalance_rule("r1", 0, &[("BTC", 50.0), ("XLM", 50.0)]));
        v.rules.push(rebalance_rule("r2", 0, &[("BTC", 20.0), ("ETH", 80.0)]));

        let ids: Vec<String> = assets_to_price(&v).into_iter().map(|a| a.asset_id).collect();
        assert_eq!(ids, vec!["XLM", "USDC", "BTC", "ETH"]);
    }

    #[test]
    fn initial_deposit_takes_unit_prices_by_default() {
        let req = request(vault(&[("XLM", 60.0), ("USDC", 40.0)]), "2024-01-03");
        let config = BacktestConfig::from_request(&req).unwrap();
        assert_eq!(config.initial_holdings, InitialHoldings::UnitPrice);
        let prices = price_data(&config, &["XLM", "USDC"], |id, _| {
            if id == "XLM" { 0.10 } else { 1.0 }
        });

        let sim = Simulation::new(&config, &req.vault_config, &prices).unwrap();

        assert_eq!(sim.state(), SimulationState::Running);
        assert!((sim.portfolio().holdings.get("XLM").unwrap() - 6_000.0).abs() < 1e-9);
        assert!((sim.portfolio().holdings.get("USDC").unwrap() - 4_000.0).abs() < 1e-9);
        // 6000 * 0.10 + 4000
        assert!((sim.portfolio().total_value - 4_600.0).abs() < 1e-9);
        assert_eq!(sim.record.timeline[0].amount, Some(10_000.0));
    }

    #[test]
    fn market_price_holdings_buy_at_first_prices() {
        let mut req = request(vault(&[("XLM", 60.0), ("USDC", 40.0)]), "2024-01-03");
        req.initial_holdings = Some(InitialHoldings::MarketPrice);
        let config = BacktestConfig::from_request(&req).unwrap();
        let prices = price_data(&config, &["XLM", "USDC"], |id, _| {
            if id == "XLM" { 0.12 } else { 1.0 }
        });

        let sim = Simulation::new(&config, &req.vault_config, &prices).unwrap();

        assert!((sim.portfolio().holdings.get("XLM").unwrap() - 50_000.0).abs() < 1e-6);
        assert!((sim.portfolio().total_value - 10_000.0).abs() < 1e-9);
    }

    #[test]
    fn initial_holdings_modes_parse() {
        assert_eq!("unit_price".parse::<InitialHoldings>(), Ok(InitialHoldings::UnitPrice));
        assert_eq!(" Market_Price ".parse::<InitialHoldings>(), Ok(InitialHoldings::MarketPrice));
        assert!("spot".parse::<InitialHoldings>().is_err());
    }

    #[test]
    fn duplicate_asset_ids_are_rejected() {
        let doubled = request(vault(&[("USDC", 50.0), ("USDC", 50.0)]), "2024-01-31");
        assert!(matches!(
            BacktestConfig::from_request(&doubled),
            Err(VaultsimError::InvalidRequest { ref field, ref reason })
                if field == "vaultConfig.assets" && reason.contains("USDC")
        ));

        let mut v = vault(&[("XLM", 50.0), ("USDC", 50.0)]);
        v.rules.push(rebalance_rule("r1", 0, &[("XLM", 30.0), ("XLM", 70.0)]));
        let doubled_target = request(v, "2024-01-31");
        assert!(matches!(
            BacktestConfig::from_request(&doubled_target),
            Err(VaultsimError::InvalidRequest { ref field, .. })
                if field == "vaultConfig.rules.actions.targetAllocations"
        ));
    }

    #[test]
    fn run_without_rules_records_every_tick() {
        let req = request(vault(&[("XLM", 50.0), ("USDC", 50.0)]), "2024-01-11");
        let config = BacktestConfig::from_request(&req).unwrap();
        let prices = price_data(&config, &["XLM", "USDC"], |id, d| {
            if id == "XLM" { 1.0 + d as f64 * 0.1 } else { 1.0 }
        });

        let mut sim = Simulation::new(&config, &req.vault_config, &prices).unwrap();
        sim.run().unwrap();
        assert_eq!(sim.state(), SimulationState::Completed);
        let record = sim.into_record();

        assert_eq!(record.value_history.len(), 11);
        assert_eq!(record.allocation_history.len(), 11);
        assert_eq!(record.timeline.len(), 1);
        assert_eq!(record.timeline[0].transaction_type, TransactionType::Deposit);
        assert_eq!(record.num_rebalances, 0);
        // XLM doubles: 5000 * 2 + 5000
        let last = record.value_history.last().unwrap();
        assert!((last.value - 15_000.0).abs() < 1e-6);
    }

    #[test]
    fn higher_priority_rule_applies_first() {
        let mut v = vault(&[("XLM", 50.0), ("USDC", 50.0)]);
        v.rules.push(rebalance_rule("low", 1, &[("XLM", 20.0), ("USDC", 80.0)]));
        v.rules.push(rebalance_rule("high", 9, &[("XLM", 90.0), ("USDC", 10.0)]));
        let req = request(v, "2024-01-02");
        let config = BacktestConfig::from_request(&req).unwrap();
        let prices = price_data(&config, &["XLM", "USDC"], |id, _| {
            if id == "XLM" { 2.0 } else { 1.0 }
        });

        let mut sim = Simulation::new(&config, &req.vault_config, &prices).unwrap();
        sim.step(config.start).unwrap();

        // both fire on the first tick; the low-priority rule runs last and wins
        assert!((sim.portfolio().allocation_pct("XLM") - 20.0).abs() < 1e-9);
        let rules: Vec<&str> = sim.record.timeline[1..]
            .iter()
            .filter_map(|t| t.triggered_rule.as_deref())
            .collect();
        assert_eq!(rules, vec!["high", "low"]);
    }

    #[test]
    fn fee_entries_follow_rebalances() {
        let mut v = vault(&[("XLM", 50.0), ("USDC", 50.0)]);
        v.management_fee = Some(1.0);
        v.rules.push(rebalance_rule("weekly", 0, &[("XLM", 50.0), ("USDC", 50.0)]));
        let req = request(v, "2024-01-15");
        let config = BacktestConfig::from_request(&req).unwrap();
        let prices = price_data(&config, &["XLM", "USDC"], |_, _| 1.0);

        let mut sim = Simulation::new(&config, &req.vault_config, &prices).unwrap();
        sim.run().unwrap();
        assert_eq!(sim.state(), SimulationState::Completed);
        let record = sim.into_record();

        // days 0, 7 and 14
        assert_eq!(record.num_rebalances, 3);
        let kinds: Vec<TransactionType> =
            record.timeline.iter().map(|t| t.transaction_type).collect();
        assert_eq!(
            kinds,
            vec![
                TransactionType::Deposit,
                TransactionType::Rebalance,
                TransactionType::Fee,
                TransactionType::Rebalance,
                TransactionType::Fee,
                TransactionType::Rebalance,
                TransactionType::Fee,
            ]
        );
        let expected_fees = 100.0 + 99.0 + 98.01;
        assert!((record.total_fees - expected_fees).abs() < 1e-9);
        assert!((record.timeline.last().unwrap().cumulative_fees - expected_fees).abs() < 1e-9);
        assert!((record.timeline[2].amount.unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn missing_rebalance_price_aborts_run() {
        let mut v = vault(&[("USDC", 100.0)]);
        v.rules.push(rebalance_rule("to_btc", 0, &[("BTC", 100.0)]));
        let req = request(v, "2024-01-05");
        let config = BacktestConfig::from_request(&req).unwrap();
        let prices = price_data(&config, &["USDC"], |_, _| 1.0);

        let mut sim = Simulation::new(&config, &req.vault_config, &prices).unwrap();
        let result = sim.run();
        assert!(matches!(result, Err(VaultsimError::MissingPrice { .. })));
        assert_eq!(sim.state(), SimulationState::Running);
    }

    #[test]
    fn empty_price_data_is_rejected() {
        let req = request(vault(&[("USDC", 100.0)]), "2024-01-05");
        let config = BacktestConfig::from_request(&req).unwrap();
        let prices = PriceData {
            assets: vec![],
            used_mock_data: false,
            warning: None,
        };
        assert!(matches!(
            Simulation::new(&config, &req.vault_config, &prices),
            Err(VaultsimError::EmptyDataset { .. })
        ));
    }

    #[test]
    fn run_backtest_with_default_provider_prices_stablecoins() {
        let req = request(vault(&[("USDC", 100.0)]), "2024-02-01");
        let result = run_backtest(&req, &PriceDataProvider::new()).unwrap();

        assert_eq!(result.metrics.final_value, 10_000.0);
        assert_eq!(result.metrics.total_return, 0.0);
        assert!(!result.metrics.used_mock_data);
        assert_eq!(result.portfolio_value_history.len(), 32);
        assert_eq!(result.request, req);
    }

    #[test]
    fn request_json_uses_camel_case() {
        let json = r#"{
            "vaultConfig": {
                "assets": [{"assetId": "USDC", "assetCode": "USDC", "percentage": 100}],
                "managementFee": 0.5
            },
            "startTime": "2024-01-01",
            "endTime": "2024-03-01",
            "initialCapital": 2500,
            "resolution": 3600000
        }"#;
        let req: BacktestRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.resolution, Some(3_600_000));
        assert_eq!(req.vault_config.management_fee_pct(), 0.5);
        assert!(req.vault_config.rules.is_empty());
        assert!(req.risk_free_rate.is_none());
        assert!(req.initial_holdings.is_none());

        let with_mode = json.replace(
            "\"resolution\": 3600000",
            "\"resolution\": 3600000, \"initialHoldings\": \"market_price\"",
        );
        let req: BacktestRequest = serde_json::from_str(&with_mode).unwrap();
        assert_eq!(req.initial_holdings, Some(InitialHoldings::MarketPrice));
    }
}
