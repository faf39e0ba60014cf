//! Account risk types

use serde::{Deserialize, Serialize};

/// Account-wide risk aggregate, fully recomputed from the position set.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub total_equity: f64,
    pub used_margin: f64,
    /// `total_equity − used_margin`; may be negative.
    pub available_margin: f64,
    /// `used_margin / total_equity`, or 0 when equity is not positive.
    pub margin_ratio: f64,
    pub daily_pnl: f64,
    pub drawdown: f64,
    pub var_95: f64,
    pub max_position_size: f64,
    pub position_concentration: f64,
}

/// Account-level inputs that cannot be derived from positions.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountState {
    pub total_equity: f64,
    pub drawdown: f64,
    pub var_95: f64,
}

impl AccountState {
    pub fn with_equity(total_equity: f64) -> Self {
        Self {
            total_equity,
            ..Self::default()
        }
    }
}
