//! Rebalance execution and management-fee accounting.
//!
//! A rebalance replaces the holdings wholesale at current prices; there is no
//! slippage or partial-fill model. The management fee is a flat percentage of
//! portfolio value charged on every rebalance event.

use tracing::debug;

use super::error::VaultsimError;
use super::portfolio::{Holdings, PortfolioState};
use super::vault::{ActionType, RebalanceAction};

/// fee = total_value * fee_pct / 100
pub fn calculate_fee(total_value: f64, fee_pct: f64) -> f64 {
    let fee = total_value * fee_pct / 100.0;
    if fee.is_finite() && fee > 0.0 { fee } else { 0.0 }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Rebalanced {
        fee: f64,
        value_before: f64,
        value_after: f64,
    },
    Skipped {
        action_type: ActionType,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceExecutor {
    pub management_fee_pct: f64,
    pub num_rebalances: usize,
    pub total_fees: f64,
}

impl RebalanceExecutor {
    pub fn new(management_fee_pct: f64) -> Self {
        RebalanceExecutor {
            management_fee_pct,
            num_rebalances: 0,
            total_fees: 0.0,
        }
    }

    /// Applies `action` to `state` at the prices given by `price_of`.
    ///
    /// Steps:
    /// 1. Non-`rebalance` actions and empty target lists are no-ops
    /// 2. Charge the fee on the current total value
    /// 3. Split the remaining value by target percentage
    /// 4. Convert each target value to an amount at the current price
    /// 5. Replace the holdings and revalue
    pub fn apply<F>(
        &mut self,
        state: &mut PortfolioState,
        action: &RebalanceAction,
        price_of: F,
        timestamp: i64,
    ) -> Result<ExecutionOutcome, VaultsimError>
    where
        F: Fn(&str) -> Option<f64>,
    {
        if action.action_type != ActionType::Rebalance {
            return Ok(ExecutionOutcome::Skipped {
                action_type: action.action_type,
                reason: "only rebalance actions are simulated",
            });
        }
        if action.target_allocations.is_empty() {
            return Ok(ExecutionOutcome::Skipped {
                action_type: action.action_type,
                reason: "rebalance has no target allocations",
            });
        }

        let value_before = state.total_value;
        let fee = calculate_fee(value_before, self.management_fee_pct);
        let investable = value_before - fee;

        let mut holdings = Holdings::new();
        for target in &action.target_allocations {
            let price = price_of(&target.asset_id)
                .filter(|p| p.is_finite() && *p > 0.0)
                .ok_or_else(|| VaultsimError::MissingPrice {
                    asset_id: target.asset_id.clone(),
                    timestamp,
                })?;
            let target_value = investable * target.percentage / 100.0;
            holdings.set(&target.asset_id, target_value / price);
        }

        state.holdings = holdings;
        state.revalue(&price_of);

        self.num_rebalances += 1;
        self.total_fees += fee;

        debug!(
            timestamp,
            fee,
            value_before,
            value_after = state.total_value,
            "Applied rebalance"
        );

        Ok(ExecutionOutcome::Rebalanced {
            fee,
            value_before,
            value_after: state.total_value,
        })
    }
}
