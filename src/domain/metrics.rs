//! Performance metrics and statistics.
//!
//! All percentages are expressed as 0-100 values. Every ratio guards its
//! denominator and resolves to 0 instead of NaN or infinity.

use serde::{Deserialize, Serialize};

use super::price::MS_PER_DAY;
use super::vault::AssetAllocation;

/// Annualization factor for per-tick volatility. Valid as documented only
/// for daily resolution.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;
pub const DAYS_PER_YEAR: f64 = 365.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestMetrics {
    pub initial_capital: f64,
    pub final_value: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    pub max_drawdown_amount: f64,
    pub max_drawdown_duration: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub calmar_ratio: f64,
    pub buy_and_hold_return: f64,
    pub outperformance: f64,
    pub num_rebalances: usize,
    pub total_fees: f64,
    pub days_elapsed: f64,
    pub used_mock_data: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_warning: Option<String>,
}

/// One point of the per-tick portfolio value history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValuePoint {
    pub timestamp: i64,
    pub value: f64,
}

/// Everything the calculator needs from a finished run.
pub struct MetricsInput<'a> {
    pub initial_capital: f64,
    pub start: i64,
    pub end: i64,
    pub values: &'a [ValuePoint],
    pub initial_targets: &'a [AssetAllocation],
    /// Price of an asset at (or nearest to) a timestamp.
    pub price_at: &'a dyn Fn(&str, i64) -> Option<f64>,
    pub risk_free_rate: f64,
    pub num_rebalances: usize,
    pub total_fees: f64,
    pub used_mock_data: bool,
    pub data_warning: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Drawdown {
    /// Percent of the peak.
    pub max_pct: f64,
    pub amount: f64,
    pub peak_value: f64,
    /// Days from the peak to the trough of the deepest episode.
    pub duration_days: f64,
}

fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() { x } else { 0.0 }
}

fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        finite_or_zero(numerator / denominator)
    }
}

/// Population standard deviation; 0 for fewer than two samples.
pub fn std_dev(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

/// r_i = (v_i - v_{i-1}) / v_{i-1}; a zero previous value yields 0.
pub fn tick_returns(values: &[ValuePoint]) -> Vec<f64> {
    values
        .windows(2)
        .map(|w| safe_div(w[1].value - w[0].value, w[0].value))
        .collect()
}

pub fn total_return_pct(initial: f64, final_value: f64) -> f64 {
    safe_div(final_value - initial, initial) * 100.0
}

/// Compound annual growth; no extrapolation when `years <= 0`.
pub fn annualized_return_pct(initial: f64, final_value: f64, years: f64) -> f64 {
    if years <= 0.0 {
        return total_return_pct(initial, final_value);
    }
    let growth = safe_div(final_value, initial);
    finite_or_zero((growth.powf(1.0 / years) - 1.0) * 100.0)
}

pub fn volatility_pct(returns: &[f64]) -> f64 {
    finite_or_zero(std_dev(returns) * TRADING_DAYS_PER_YEAR.sqrt() * 100.0)
}

/// Standard deviation of the negative returns alone, annualized like volatility.
pub fn downside_deviation_pct(returns: &[f64]) -> f64 {
    let negatives: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    volatility_pct(&negatives)
}

pub fn compute_drawdown(values: &[ValuePoint]) -> Drawdown {
    let mut result = Drawdown {
        max_pct: 0.0,
        amount: 0.0,
        peak_value: values.first().map(|p| p.value).unwrap_or(0.0),
        duration_days: 0.0,
    };
    let Some(first) = values.first() else {
        return result;
    };

    let mut peak = *first;
    let mut max_dd = 0.0_f64;
    for point in values {
        if point.value > peak.value {
            peak = *point;
            continue;
        }
        if peak.value <= 0.0 {
            continue;
        }
        let dd = (peak.value - point.value) / peak.value;
        if dd > max_dd {
            max_dd = dd;
            result.amount = peak.value - point.value;
            result.peak_value = peak.value;
            result.duration_days = (point.timestamp - peak.timestamp) as f64 / MS_PER_DAY as f64;
        }
    }
    result.max_pct = finite_or_zero(max_dd * 100.0);
    result
}

pub fn win_rate_pct(returns: &[f64]) -> f64 {
    let wins = returns.iter().filter(|r| **r > 0.0).count();
    safe_div(wins as f64, returns.len() as f64) * 100.0
}

pub fn profit_factor(returns: &[f64]) -> f64 {
    let gains: f64 = returns.iter().filter(|r| **r > 0.0).sum();
    let losses: f64 = returns.iter().filter(|r| **r < 0.0).sum();
    safe_div(gains, losses.abs())
}

/// Weighted price change of the initial allocation, ignoring rebalances.
pub fn buy_and_hold_return_pct(
    targets: &[AssetAllocation],
    price_at: &dyn Fn(&str, i64) -> Option<f64>,
    start: i64,
    end: i64,
) -> f64 {
    let fraction: f64 = targets
        .iter()
        .filter_map(|target| {
            let start_price = price_at(&target.asset_id, start)?;
            let end_price = price_at(&target.asset_id, end)?;
            Some(safe_div(end_price - start_price, start_price) * target.percentage / 100.0)
        })
        .sum();
    finite_or_zero(fraction * 100.0)
}

impl BacktestMetrics {
    pub fn compute(input: &MetricsInput<'_>) -> Self {
        let initial = input.initial_capital;
        let final_value = input.values.last().map(|p| p.value).unwrap_or(initial);

        let total_return = total_return_pct(initial, final_value);
        let days_elapsed = (input.end - input.start) as f64 / MS_PER_DAY as f64;
        let years_elapsed = days_elapsed / DAYS_PER_YEAR;
        let annualized_return = annualized_return_pct(initial, final_value, years_elapsed);

        let returns = tick_returns(input.values);
        let volatility = volatility_pct(&returns);
        let downside = downside_deviation_pct(&returns);
        let excess = annualized_return - input.risk_free_rate * 100.0;

        let drawdown = compute_drawdown(input.values);
        let buy_and_hold_return =
            buy_and_hold_return_pct(input.initial_targets, input.price_at, input.start, input.end);

        BacktestMetrics {
            initial_capital: initial,
            final_value,
            total_return,
            annualized_return,
            volatility,
            sharpe_ratio: safe_div(excess, volatility),
            sortino_ratio: safe_div(excess, downside),
            max_drawdown: drawdown.max_pct,
            max_drawdown_amount: drawdown.amount,
            max_drawdown_duration: drawdown.duration_days,
            win_rate: win_rate_pct(&returns),
            profit_factor: profit_factor(&returns),
            calmar_ratio: safe_div(annualized_return, drawdown.max_pct),
            buy_and_hold_return,
            outperformance: total_return - buy_and_hold_return,
            num_rebalances: input.num_rebalances,
            total_fees: input.total_fees,
            days_elapsed,
            used_mock_data: input.used_mock_data,
            data_warning: input.data_warning.clone(),
        }
    }
}
