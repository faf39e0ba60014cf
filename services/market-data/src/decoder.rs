//! Snapshot decoder
//!
//! Pure mapping from segment bytes to a [`DepthSnapshot`] and the live
//! entries of the trade ring. The producer may be writing while we copy, so
//! a decoded value can be internally inconsistent. No attempt is made to
//! detect that here; consumers filter for plausibility (empty book sides,
//! sentinel levels) instead.

use bytemuck::try_pod_read_unaligned;
use thiserror::Error;
use types::market::{DepthSnapshot, PriceLevel, TradeRecord, TRADE_RING_CAPACITY};

use crate::layout::{RawDepth, RawPriceLevel, RawTrade, DEPTH_SIZE, SEGMENT_SIZE, TRADE_SIZE};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("segment is {len} bytes, need at least {required}")]
    Truncated { len: usize, required: usize },

    #[error("depth block unreadable: {0}")]
    Depth(String),
}

/// Decoded contents of one segment read.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodedSegment {
    pub depth: DepthSnapshot,
    /// Non-empty trade slots in ring order (not necessarily chronological).
    pub trades: Vec<TradeRecord>,
}

/// Decode a full segment.
///
/// Fails only when the buffer is shorter than the declared layout. Trade
/// slots that cannot be read are skipped.
pub fn decode_segment(bytes: &[u8]) -> Result<DecodedSegment, DecodeError> {
    if bytes.len() < SEGMENT_SIZE {
        return Err(DecodeError::Truncated {
            len: bytes.len(),
            required: SEGMENT_SIZE,
        });
    }

    let depth = decode_depth(&bytes[..DEPTH_SIZE])?;

    let trades = bytes[DEPTH_SIZE..SEGMENT_SIZE]
        .chunks_exact(TRADE_SIZE)
        .take(TRADE_RING_CAPACITY)
        .filter_map(|slot| try_pod_read_unaligned::<RawTrade>(slot).ok())
        .filter_map(|raw| decode_trade(&raw))
        .collect();

    Ok(DecodedSegment { depth, trades })
}

/// Decode the depth block, dropping sentinel levels.
pub fn decode_depth(bytes: &[u8]) -> Result<DepthSnapshot, DecodeError> {
    let raw: RawDepth =
        try_pod_read_unaligned(bytes).map_err(|e| DecodeError::Depth(format!("{e:?}")))?;

    Ok(DepthSnapshot {
        exchange_timestamp: raw.exchange_ts,
        local_timestamp: raw.local_ts,
        bids: decode_levels(&raw.bids),
        asks: decode_levels(&raw.asks),
    })
}

fn decode_levels(raw: &[RawPriceLevel]) -> Vec<PriceLevel> {
    raw.iter()
        .map(|l| PriceLevel::new(l.price, l.quantity))
        .filter(|l| !l.is_sentinel())
        .collect()
}

/// Decode one trade slot, or `None` if the slot is empty.
pub fn decode_trade(raw: &RawTrade) -> Option<TradeRecord> {
    if TradeRecord::is_empty_slot(raw.price, raw.quantity) {
        return None;
    }

    Some(TradeRecord {
        price: raw.price,
        quantity: raw.quantity,
        exchange_timestamp: raw.exchange_ts,
        local_timestamp: raw.local_ts,
        trade_id: decode_trade_id(&raw.trade_id),
        is_buyer_maker: raw.is_buyer_maker != 0,
    })
}

/// Bytes up to the first NUL (or the whole field), lossily decoded as UTF-8.
pub fn decode_trade_id(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}
