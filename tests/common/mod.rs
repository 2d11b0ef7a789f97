#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use vaultsim::domain::backtest::BacktestRequest;
use vaultsim::domain::error::VaultsimError;
use vaultsim::domain::price::{MS_PER_DAY, PricePoint, PriceSeries, PriceWindow};
use vaultsim::domain::pricing::PriceDataProvider;
use vaultsim::domain::vault::{
    ActionType, AssetAllocation, ComparisonOperator, ConditionType, RebalanceAction,
    RebalanceCondition, RebalanceRule, VaultConfig,
};
use vaultsim::ports::price_port::HistoricalPriceSource;

pub const DAY: i64 = MS_PER_DAY;

/// Price as a function of whole days since the window start.
pub type PriceFn = fn(i64) -> f64;

/// Serves a grid-aligned series per asset code and counts fetches.
pub struct MockPriceSource {
    pub name: &'static str,
    pub prices: HashMap<String, PriceFn>,
    pub errors: HashMap<String, String>,
    pub calls: AtomicUsize,
}

impl MockPriceSource {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            prices: HashMap::new(),
            errors: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_prices(mut self, code: &str, f: PriceFn) -> Self {
        self.prices.insert(code.to_string(), f);
        self
    }

    pub fn with_error(mut self, code: &str, reason: &str) -> Self {
        self.errors.insert(code.to_string(), reason.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HistoricalPriceSource for MockPriceSource {
    fn name(&self) -> &'static str {
        self.name
    }

    fn fetch(
        &self,
        asset_code: &str,
        _counter_asset: &str,
        window: &PriceWindow,
    ) -> Result<PriceSeries, VaultsimError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.errors.get(asset_code) {
            return Err(VaultsimError::price_source(self.name, reason.clone()));
        }
        let Some(f) = self.prices.get(asset_code) else {
            return Ok(PriceSeries::from_unordered(Vec::new()));
        };
        let points = window
            .ticks()
            .map(|t| PricePoint {
                timestamp: t,
                price: f((t - window.start) / DAY),
            })
            .collect();
        Ok(PriceSeries::from_unordered(points))
    }
}

/// A provider whose trade history and quote slots both serve `prices`.
pub fn provider_with(prices: &[(&str, PriceFn)]) -> PriceDataProvider {
    let build = || {
        prices
            .iter()
            .fold(MockPriceSource::new("mock"), |s, (code, f)| {
                s.with_prices(code, *f)
            })
    };
    PriceDataProvider::new()
        .with_trade_history(Box::new(build()))
        .with_quote_source(Box::new(build()))
}

pub fn allocation(id: &str, pct: f64) -> AssetAllocation {
    AssetAllocation::new(id, id, pct)
}

pub fn vault(assets: &[(&str, f64)]) -> VaultConfig {
    VaultConfig {
        assets: assets.iter().map(|(id, pct)| allocation(id, *pct)).collect(),
        rules: vec![],
        management_fee: None,
    }
}

pub fn condition(
    condition_type: ConditionType,
    operator: ComparisonOperator,
    value: f64,
    asset_id: Option<&str>,
) -> RebalanceCondition {
    RebalanceCondition {
        condition_type,
        operator,
        value,
        asset_id: asset_id.map(str::to_string),
    }
}

pub fn rule(
    id: &str,
    priority: i32,
    conditions: Vec<RebalanceCondition>,
    targets: &[(&str, f64)],
) -> RebalanceRule {
    RebalanceRule {
        id: id.to_string(),
        name: id.to_string(),
        conditions,
        actions: vec![RebalanceAction {
            action_type: ActionType::Rebalance,
            target_allocations: targets.iter().map(|(id, pct)| allocation(id, *pct)).collect(),
            params: None,
        }],
        enabled: true,
        priority,
    }
}

/// Rebalances to `targets` every `days` days.
pub fn periodic_rule(id: &str, days: i64, targets: &[(&str, f64)]) -> RebalanceRule {
    rule(
        id,
        0,
        vec![condition(
            ConditionType::Time,
            ComparisonOperator::Gte,
            (days * DAY) as f64,
            None,
        )],
        targets,
    )
}

pub fn request(vault_config: VaultConfig, start: &str, end: &str) -> BacktestRequest {
    BacktestRequest {
        vault_config,
        start_time: start.to_string(),
        end_time: end.to_string(),
        initial_capital: 10_000.0,
        resolution: None,
        risk_free_rate: None,
        initial_holdings: None,
    }
}

/// 0.10 rising by 1% of the base price per day.
pub fn linear_xlm(day: i64) -> f64 {
    0.1 * (1.0 + 0.01 * day as f64)
}

/// Alternates 1.0 / 1.5 day to day.
pub fn choppy(day: i64) -> f64 {
    if day % 2 == 0 { 1.0 } else { 1.5 }
}
