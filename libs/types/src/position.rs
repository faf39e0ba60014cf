//! Position tracking types
//!
//! A position is keyed by instrument. Quantity is signed: short positions
//! carry a negative quantity.

use serde::{Deserialize, Serialize};

/// Position structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Position {
    pub instrument: String,
    pub quantity: f64,
    pub entry_price: f64,
    pub current_price: f64,
    pub unrealized_pnl: f64,
    pub realized_pnl: f64,
    pub liquidation_price: Option<f64>,
    pub margin_ratio: f64,
    /// Unix epoch milliseconds of the last mark.
    pub last_update: i64,
}

impl Default for Position {
    fn default() -> Self {
        Self::placeholder("", 0)
    }
}

impl Position {
    /// Zero-state position used until a real position feed is available.
    pub fn placeholder(instrument: impl Into<String>, timestamp: i64) -> Self {
        Self {
            instrument: instrument.into(),
            quantity: 0.0,
            entry_price: 0.0,
            current_price: 0.0,
            unrealized_pnl: 0.0,
            realized_pnl: 0.0,
            liquidation_price: None,
            margin_ratio: 0.0,
            last_update: timestamp,
        }
    }

    /// Open position with the given signed quantity and entry price.
    pub fn open(
        instrument: impl Into<String>,
        quantity: f64,
        entry_price: f64,
        timestamp: i64,
    ) -> Self {
        Self {
            quantity,
            entry_price,
            current_price: entry_price,
            ..Self::placeholder(instrument, timestamp)
        }
    }

    /// Mark the position to a new price and recalculate unrealized PnL.
    ///
    /// `unrealized_pnl = quantity × (current_price − entry_price)`
    pub fn update_mark_price(&mut self, mark_price: f64, timestamp: i64) {
        self.current_price = mark_price;
        self.unrealized_pnl = self.quantity * (mark_price - self.entry_price);
        self.last_update = timestamp;
    }

    /// Absolute notional value at the current mark: `|quantity × current_price|`.
    pub fn notional(&self) -> f64 {
        (self.quantity * self.current_price).abs()
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0.0
    }
}
