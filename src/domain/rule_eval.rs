//! Rebalance rule evaluation.
//!
//! # Evaluation Semantics
//!
//! - Only enabled rules are considered; conditions are a logical AND
//! - `time`: passes when `tick - last_trigger(rule_id) >= value` (ms). The
//!   last trigger is tracked per rule id and defaults to 0 (never triggered)
//! - `allocation`: current weight of `asset_id` (percent) `<op>` value
//! - `price`: current price of `asset_id` `<op>` value
//! - `apy`: not computed in the simulation; always fails
//! - Triggered rules are ordered by descending priority, ties keep list order

use std::collections::HashMap;

use super::portfolio::PortfolioState;
use super::vault::{ConditionType, RebalanceCondition, RebalanceRule};

/// Market view a condition is evaluated against.
pub struct TickContext<'a, F>
where
    F: Fn(&str) -> Option<f64>,
{
    pub timestamp: i64,
    pub portfolio: &'a PortfolioState,
    pub price_of: F,
}

#[derive(Debug, Clone, Default)]
pub struct RuleEvaluator {
    last_triggered: HashMap<String, i64>,
}

impl RuleEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_triggered(&self, rule_id: &str) -> i64 {
        self.last_triggered.get(rule_id).copied().unwrap_or(0)
    }

    pub fn mark_triggered(&mut self, rule_id: &str, timestamp: i64) {
        self.last_triggered.insert(rule_id.to_string(), timestamp);
    }

    pub fn condition_passes<F>(
        &self,
        rule_id: &str,
        condition: &RebalanceCondition,
        ctx: &TickContext<'_, F>,
    ) -> bool
    where
        F: Fn(&str) -> Option<f64>,
    {
        match condition.condition_type {
            ConditionType::Time => {
                let elapsed = ctx.timestamp - self.last_triggered(rule_id);
                elapsed as f64 >= condition.value
            }
            ConditionType::Allocation => match condition.asset_id.as_deref() {
                Some(asset_id) => condition
                    .operator
                    .compare(ctx.portfolio.allocation_pct(asset_id), condition.value),
                None => false,
            },
            ConditionType::Price => condition
                .asset_id
                .as_deref()
                .and_then(|asset_id| (ctx.price_of)(asset_id))
                .is_some_and(|price| condition.operator.compare(price, condition.value)),
            ConditionType::Apy => false,
        }
    }

    pub fn rule_triggers<F>(&self, rule: &RebalanceRule, ctx: &TickContext<'_, F>) -> bool
    where
        F: Fn(&str) -> Option<f64>,
    {
        rule.enabled
            && rule
                .conditions
                .iter()
                .all(|c| self.condition_passes(&rule.id, c, ctx))
    }

    /// Rules that trigger at this tick, highest priority first.
    pub fn triggered<'r, F>(
        &self,
        rules: &'r [RebalanceRule],
        ctx: &TickContext<'_, F>,
    ) -> Vec<&'r RebalanceRule>
    where
        F: Fn(&str) -> Option<f64>,
    {
        let mut triggered: Vec<&RebalanceRule> = rules
            .iter()
            .filter(|rule| self.rule_triggers(rule, ctx))
            .collect();
        triggered.sort_by(|a, b| b.priority.cmp(&a.priority));
        triggered
    }
}
