//! Exposure and PnL aggregation over a position set

use types::position::Position;

/// Notional position value: `|quantity × current_price|`
pub fn position_value(position: &Position) -> f64 {
    position.notional()
}

/// Total exposure across all positions.
///
/// `total_exposure = Σ |quantity × current_price|`
pub fn total_exposure<'a>(positions: impl IntoIterator<Item = &'a Position>) -> f64 {
    positions
        .into_iter()
        .fold(0.0, |acc, pos| acc + position_value(pos))
}

/// Largest single notional, 0 for an empty set.
pub fn max_exposure<'a>(positions: impl IntoIterator<Item = &'a Position>) -> f64 {
    positions
        .into_iter()
        .map(position_value)
        .fold(0.0, f64::max)
}

/// `Σ unrealized_pnl`
pub fn total_unrealized_pnl<'a>(positions: impl IntoIterator<Item = &'a Position>) -> f64 {
    positions
        .into_iter()
        .fold(0.0, |acc, pos| acc + pos.unrealized_pnl)
}

/// `Σ realized_pnl`
pub fn total_realized_pnl<'a>(positions: impl IntoIterator<Item = &'a Position>) -> f64 {
    positions
        .into_iter()
        .fold(0.0, |acc, pos| acc + pos.realized_pnl)
}
