//! Market depth and trade types
//!
//! Decoded forms of the producer's shared-memory snapshot plus the public
//! shapes broadcast to subscribers and returned by the query surface.

use serde::{Deserialize, Serialize};

/// Number of price level slots per book side in a producer snapshot.
pub const BOOK_DEPTH: usize = 10;

/// Number of trade slots in the producer's recent-trade ring.
pub const TRADE_RING_CAPACITY: usize = 10;

/// A single price level of one book side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub quantity: f64,
}

impl PriceLevel {
    pub fn new(price: f64, quantity: f64) -> Self {
        Self { price, quantity }
    }

    /// Whether this slot is unusable: an unused sentinel (non-positive
    /// price) or a torn value (non-finite price or quantity).
    pub fn is_sentinel(&self) -> bool {
        !(self.price.is_finite() && self.price > 0.0 && self.quantity.is_finite())
    }
}

/// One decoded depth snapshot.
///
/// `bids` and `asks` keep the producer's slot order but contain only
/// non-sentinel levels. Slot order is not assumed to be price order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DepthSnapshot {
    pub exchange_timestamp: u64,
    pub local_timestamp: u64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

impl DepthSnapshot {
    /// Highest bid price, found by scanning every level.
    pub fn best_bid(&self) -> Option<f64> {
        self.bids
            .iter()
            .filter(|l| !l.is_sentinel())
            .map(|l| l.price)
            .fold(None, |best, p| match best {
                Some(b) if b >= p => Some(b),
                _ => Some(p),
            })
    }

    /// Lowest ask price, found by scanning every level.
    pub fn best_ask(&self) -> Option<f64> {
        self.asks
            .iter()
            .filter(|l| !l.is_sentinel())
            .map(|l| l.price)
            .fold(None, |best, p| match best {
                Some(b) if b <= p => Some(b),
                _ => Some(p),
            })
    }

    /// Average of best bid and best ask, or `None` if either side is empty.
    /// Halved before adding so extreme prices cannot overflow.
    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(bid / 2.0 + ask / 2.0).filter(|m| m.is_finite()),
            _ => None,
        }
    }

    /// Whether either side of the book has no usable levels.
    pub fn has_empty_side(&self) -> bool {
        self.best_bid().is_none() || self.best_ask().is_none()
    }

    /// Public depth view tagged with the instrument it was read for.
    pub fn to_market_depth(&self, instrument: &str) -> MarketDepth {
        MarketDepth {
            instrument: instrument.to_string(),
            timestamp: self.exchange_timestamp,
            bids: self.bids.clone(),
            asks: self.asks.clone(),
        }
    }
}

/// One decoded entry of the producer's recent-trade ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub price: f64,
    pub quantity: f64,
    pub exchange_timestamp: u64,
    pub local_timestamp: u64,
    pub trade_id: String,
    pub is_buyer_maker: bool,
}

impl TradeRecord {
    /// Whether a slot with this price and quantity is empty.
    pub fn is_empty_slot(price: f64, quantity: f64) -> bool {
        !(price > 0.0 && quantity > 0.0 && price.is_finite() && quantity.is_finite())
    }

    /// Public trade view tagged with the instrument it was read for.
    pub fn to_public(&self, instrument: &str) -> PublicTrade {
        PublicTrade {
            instrument: instrument.to_string(),
            price: self.price,
            quantity: self.quantity,
            timestamp: self.exchange_timestamp,
            trade_id: self.trade_id.clone(),
            is_buyer_maker: self.is_buyer_maker,
        }
    }
}

/// Depth as seen by subscribers and query callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDepth {
    pub instrument: String,
    /// Exchange timestamp of the snapshot.
    pub timestamp: u64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// Trade as seen by subscribers and query callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicTrade {
    pub instrument: String,
    pub price: f64,
    pub quantity: f64,
    /// Exchange timestamp of the trade.
    pub timestamp: u64,
    pub trade_id: String,
    pub is_buyer_maker: bool,
}
