//! Types library for the market data distribution service
//!
//! Core type definitions shared by the segment decoder, the position and
//! risk engine, the broadcast hub and the gateway.
//!
//! # Modules
//! - `market`: Depth levels, depth snapshots and trade records
//! - `position`: Position tracking types
//! - `risk`: Account risk aggregates and account-level inputs
//! - `errors`: Error taxonomy

pub mod market;
pub mod position;
pub mod risk;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Current wall-clock time as Unix epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::market::*;
    pub use crate::position::*;
    pub use crate::risk::*;
    pub use crate::errors::*;
}
