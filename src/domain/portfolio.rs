//! Holdings ledger and per-tick valuation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Current weight of one asset, in percent of total value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationSnapshot {
    pub asset_id: String,
    pub percentage: f64,
    pub value: f64,
}

/// Ordered `(asset_id, amount)` pairs with a lookup index, so iteration
/// order is the insertion order and never depends on hashing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Holdings {
    entries: Vec<(String, f64)>,
    index: HashMap<String, usize>,
}

impl Holdings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the amount for `asset_id`, appending it if unseen.
    pub fn set(&mut self, asset_id: &str, amount: f64) {
        match self.index.get(asset_id) {
            Some(&i) => self.entries[i].1 = amount,
            None => {
                self.index.insert(asset_id.to_string(), self.entries.len());
                self.entries.push((asset_id.to_string(), amount));
            }
        }
    }

    pub fn get(&self, asset_id: &str) -> Option<f64> {
        self.index.get(asset_id).map(|&i| self.entries[i].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(id, amount)| (id.as_str(), *amount))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Portfolio of one simulation run. Owned exclusively by that run.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioState {
    pub holdings: Holdings,
    pub total_value: f64,
    pub allocations: Vec<AllocationSnapshot>,
}

impl PortfolioState {
    pub fn new(holdings: Holdings) -> Self {
        PortfolioState {
            holdings,
            total_value: 0.0,
            allocations: Vec::new(),
        }
    }

    /// Recomputes value and weights from `price_of`. Assets without a price
    /// are valued at zero.
    pub fn revalue<F>(&mut self, price_of: F)
    where
        F: Fn(&str) -> Option<f64>,
    {
        let values: Vec<(String, f64)> = self
            .holdings
            .iter()
            .map(|(id, amount)| (id.to_string(), amount * price_of(id).unwrap_or(0.0)))
            .collect();
        let total: f64 = values.iter().map(|(_, v)| v).sum();

        self.total_value = total;
        self.allocations = values
            .into_iter()
            .map(|(asset_id, value)| AllocationSnapshot {
                percentage: if total > 0.0 { value / total * 100.0 } else { 0.0 },
                asset_id,
                value,
            })
            .collect();
    }

    /// Current weight of `asset_id` in percent; 0 when not held.
    pub fn allocation_pct(&self, asset_id: &str) -> f64 {
        self.allocations
            .iter()
            .find(|a| a.asset_id == asset_id)
            .map(|a| a.percentage)
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prices(asset_id: &str) -> Option<f64> {
        match asset_id {
            "XLM" => Some(0.5),
            "USDC" => Some(1.0),
            _ => None,
        }
    }

    #[test]
    fn holdings_keep_insertion_order() {
        let mut holdings = Holdings::new();
        holdings.set("ZZZ", 1.0);
        holdings.set("AAA", 2.0);
        holdings.set("MMM", 3.0);
        holdings.set("AAA", 5.0);

        let order: Vec<&str> = holdings.iter().map(|(id, _)| id).collect();
        assert_eq!(order, vec!["ZZZ", "AAA", "MMM"]);
        assert_eq!(holdings.get("AAA"), Some(5.0));
        assert_eq!(holdings.get("BBB"), None);
        assert_eq!(holdings.len(), 3);
    }

    #[test]
    fn revalue_computes_total_and_weights() {
        let mut holdings = Holdings::new();
        holdings.set("XLM", 1_000.0);
        holdings.set("USDC", 500.0);
        let mut state = PortfolioState::new(holdings);

        state.revalue(prices);

        assert!((state.total_value - 1_000.0).abs() < 1e-9);
        assert!((state.allocation_pct("XLM") - 50.0).abs() < 1e-9);
        assert!((state.allocation_pct("USDC") - 50.0).abs() < 1e-9);
        assert_eq!(state.allocations[0].asset_id, "XLM");
    }

    #[test]
    fn revalue_with_zero_total_has_zero_weights() {
        let mut holdings = Holdings::new();
        holdings.set("XLM", 0.0);
        let mut state = PortfolioState::new(holdings);

        state.revalue(prices);

        assert_eq!(state.total_value, 0.0);
        assert_eq!(state.allocation_pct("XLM"), 0.0);
    }

    #[test]
    fn unpriced_assets_count_as_zero() {
        let mut holdings = Holdings::new();
        holdings.set("USDC", 100.0);
        holdings.set("GHOST", 100.0);
        let mut state = PortfolioState::new(holdings);

        state.revalue(prices);

        assert!((state.total_value - 100.0).abs() < 1e-9);
        assert!((state.allocation_pct("USDC") - 100.0).abs() < 1e-9);
        assert_eq!(state.allocation_pct("GHOST"), 0.0);
    }

    #[test]
    fn allocation_of_unknown_asset_is_zero() {
        let state = PortfolioState::new(Holdings::new());
        assert_eq!(state.allocation_pct("XLM"), 0.0);
    }
}
