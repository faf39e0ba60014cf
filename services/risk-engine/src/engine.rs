//! Position marking and risk recomputation
//!
//! Owns the tracked position set and account inputs. Every mutation is
//! followed by a full recompute of [`RiskMetrics`], so dependent fields
//! never drift apart.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use types::errors::FeedError;
use types::market::DepthSnapshot;
use types::position::Position;
use types::risk::{AccountState, RiskMetrics};

use crate::exposure;
use crate::margin;

/// Risk engine configuration
#[derive(Debug, Clone)]
pub struct RiskEngineConfig {
    /// Fraction of notional counted as used margin
    pub margin_rate: f64,
}

impl Default for RiskEngineConfig {
    fn default() -> Self {
        Self {
            margin_rate: margin::DEFAULT_MARGIN_RATE,
        }
    }
}

/// Read-only copy of the engine state handed to other components.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PortfolioView {
    pub positions: Vec<Position>,
    pub risk_metrics: RiskMetrics,
}

impl PortfolioView {
    pub fn position(&self, instrument: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.instrument == instrument)
    }
}

/// Risk engine
///
/// Uses BTreeMap so position lists come out in a stable instrument order.
#[derive(Debug, Clone)]
pub struct RiskEngine {
    config: RiskEngineConfig,
    positions: BTreeMap<String, Position>,
    account: AccountState,
    metrics: RiskMetrics,
}

impl RiskEngine {
    /// Create an engine over an initial position set.
    pub fn new(
        config: RiskEngineConfig,
        positions: Vec<Position>,
        account: AccountState,
    ) -> Self {
        let mut engine = Self {
            config,
            positions: BTreeMap::new(),
            account,
            metrics: RiskMetrics::default(),
        };
        engine.replace_positions(positions);
        engine
    }

    /// Engine tracking a zero-state placeholder for each instrument.
    pub fn with_placeholders(
        config: RiskEngineConfig,
        instruments: &[String],
        account: AccountState,
        timestamp: i64,
    ) -> Self {
        let positions = instruments
            .iter()
            .map(|i| Position::placeholder(i.as_str(), timestamp))
            .collect();
        Self::new(config, positions, account)
    }

    /// Mark `instrument` to `mid_price`.
    ///
    /// Returns false (and leaves all state untouched) if the instrument is
    /// not tracked.
    pub fn on_snapshot(&mut self, instrument: &str, mid_price: f64, timestamp: i64) -> bool {
        let Some(position) = self.positions.get_mut(instrument) else {
            return false;
        };
        position.update_mark_price(mid_price, timestamp);
        self.recompute();
        true
    }

    /// Derive the mid price from a decoded depth snapshot and mark with it.
    ///
    /// An empty book side, or a mid that is not finite, is reported as
    /// [`FeedError::EmptyBook`]; previous
    /// marks are kept. Returns the mid price if a tracked position was marked.
    pub fn apply_depth(
        &mut self,
        instrument: &str,
        depth: &DepthSnapshot,
        timestamp: i64,
    ) -> Result<Option<f64>, FeedError> {
        let mid = depth.mid_price().ok_or_else(|| FeedError::EmptyBook {
            instrument: instrument.to_string(),
        })?;

        if self.on_snapshot(instrument, mid, timestamp) {
            debug!(instrument, mid_price = mid, "Marked position");
            Ok(Some(mid))
        } else {
            Ok(None)
        }
    }

    /// Replace the whole position set, e.g. from a live position feed.
    pub fn replace_positions(&mut self, positions: Vec<Position>) {
        self.positions = positions
            .into_iter()
            .map(|p| (p.instrument.clone(), p))
            .collect();
        self.recompute();
    }

    /// Replace the account-level inputs.
    pub fn apply_account(&mut self, account: AccountState) {
        self.account = account;
        self.recompute();
    }

    fn recompute(&mut self) {
        let positions = || self.positions.values();

        let total_exposure = exposure::total_exposure(positions());
        let max_position = exposure::max_exposure(positions());
        let used = margin::used_margin(total_exposure, self.config.margin_rate);
        let equity = self.account.total_equity;

        self.metrics = RiskMetrics {
            total_equity: equity,
            used_margin: used,
            available_margin: margin::available_margin(equity, used),
            margin_ratio: margin::margin_ratio(used, equity),
            daily_pnl: exposure::total_unrealized_pnl(positions())
                + exposure::total_realized_pnl(positions()),
            drawdown: self.account.drawdown,
            var_95: self.account.var_95,
            max_position_size: max_position,
            position_concentration: margin::position_concentration(
                max_position,
                total_exposure,
            ),
        };
    }

    /// Whether a position is tracked for this instrument.
    pub fn is_tracked(&self, instrument: &str) -> bool {
        self.positions.contains_key(instrument)
    }

    pub fn position(&self, instrument: &str) -> Option<&Position> {
        self.positions.get(instrument)
    }

    /// Tracked instruments in order.
    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.positions.keys().map(String::as_str)
    }

    /// All positions in instrument order.
    pub fn positions(&self) -> Vec<Position> {
        self.positions.values().cloned().collect()
    }

    pub fn risk_metrics(&self) -> RiskMetrics {
        self.metrics
    }

    pub fn account(&self) -> AccountState {
        self.account
    }

    /// Snapshot of positions and risk for read-only consumers.
    pub fn view(&self) -> PortfolioView {
        PortfolioView {
            positions: self.positions(),
            risk_metrics: self.metrics,
        }
    }
}
