//! Margin calculation functions
//!
//! Plain account-level formulas. None of them can fault: ratios over a zero
//! denominator are defined as zero.

/// Default fraction of notional held as margin.
pub const DEFAULT_MARGIN_RATE: f64 = 0.1;

/// `used_margin = total_exposure × margin_rate`
pub fn used_margin(total_exposure: f64, margin_rate: f64) -> f64 {
    total_exposure * margin_rate
}

/// `available_margin = total_equity − used_margin`
///
/// Negative when the account is over-margined.
pub fn available_margin(total_equity: f64, used_margin: f64) -> f64 {
    total_equity - used_margin
}

/// `margin_ratio = used_margin / total_equity`
///
/// Returns 0 when equity is zero or negative.
pub fn margin_ratio(used_margin: f64, total_equity: f64) -> f64 {
    if total_equity > 0.0 {
        used_margin / total_equity
    } else {
        0.0
    }
}

/// Share of total exposure held in the largest position.
///
/// Returns 0 when there is no exposure.
pub fn position_concentration(max_position: f64, total_exposure: f64) -> f64 {
    if total_exposure > 0.0 {
        max_position / total_exposure
    } else {
        0.0
    }
}
