//! Vault configuration: target allocations and conditional rebalancing rules.
//!
//! These types are the immutable input to a backtest run and deserialize
//! straight from the API layer's JSON (camelCase fields, lowercase tags).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetAllocation {
    pub asset_id: String,
    pub asset_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_issuer: Option<String>,
    pub percentage: f64,
}

impl AssetAllocation {
    pub fn new(asset_id: &str, asset_code: &str, percentage: f64) -> Self {
        AssetAllocation {
            asset_id: asset_id.to_string(),
            asset_code: asset_code.to_string(),
            asset_issuer: None,
            percentage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionType {
    Time,
    Price,
    Apy,
    Allocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonOperator {
    Gt,
    Lt,
    Eq,
    Gte,
    Lte,
}

const EPSILON: f64 = 1e-9;

impl ComparisonOperator {
    /// `lhs <op> rhs`; `eq` tolerates floating-point noise.
    pub fn compare(self, lhs: f64, rhs: f64) -> bool {
        match self {
            ComparisonOperator::Gt => lhs > rhs,
            ComparisonOperator::Lt => lhs < rhs,
            ComparisonOperator::Eq => (lhs - rhs).abs() < EPSILON,
            ComparisonOperator::Gte => lhs >= rhs,
            ComparisonOperator::Lte => lhs <= rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceCondition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub operator: ComparisonOperator,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Rebalance,
    Stake,
    Unstake,
    ProvideLiquidity,
    RemoveLiquidity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default)]
    pub target_allocations: Vec<AssetAllocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// A conditional rule. Conditions are an implicit AND; only the first action
/// of a triggered rule is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceRule {
    pub id: String,
    pub name: String,
    pub conditions: Vec<RebalanceCondition>,
    pub actions: Vec<RebalanceAction>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultConfig {
    pub assets: Vec<AssetAllocation>,
    #[serde(default)]
    pub rules: Vec<RebalanceRule>,
    /// Percentage of portfolio value charged on every rebalance event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub management_fee: Option<f64>,
}

impl VaultConfig {
    pub fn management_fee_pct(&self) -> f64 {
        self.management_fee.unwrap_or(0.0)
    }

    pub fn target_percentage(&self, asset_id: &str) -> Option<f64> {
        self.assets
            .iter()
            .find(|a| a.asset_id == asset_id)
            .map(|a| a.percentage)
    }
}
