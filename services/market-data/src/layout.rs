//! Producer shared-memory layout
//!
//! Mirrors the producer's C structs byte for byte (native byte order,
//! natural alignment). The depth block sits at offset 0 and the trade ring
//! follows it directly.

use bytemuck::{Pod, Zeroable};
use types::market::{BOOK_DEPTH, TRADE_RING_CAPACITY};

/// Width of the zero-terminated trade identifier.
pub const TRADE_ID_LEN: usize = 32;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RawPriceLevel {
    pub price: f64,
    pub quantity: f64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RawDepth {
    pub exchange_ts: u64,
    pub local_ts: u64,
    pub bids: [RawPriceLevel; BOOK_DEPTH],
    pub asks: [RawPriceLevel; BOOK_DEPTH],
}

/// One trade slot. The producer's trailing `bool` is followed by seven
/// bytes of alignment padding, spelled out here so the struct is `Pod`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RawTrade {
    pub price: f64,
    pub quantity: f64,
    pub exchange_ts: u64,
    pub local_ts: u64,
    pub trade_id: [u8; TRADE_ID_LEN],
    pub is_buyer_maker: u8,
    pub _padding: [u8; 7],
}

/// Whole segment: depth block plus trade ring.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RawSegment {
    pub depth: RawDepth,
    pub trades: [RawTrade; TRADE_RING_CAPACITY],
}

pub const DEPTH_SIZE: usize = std::mem::size_of::<RawDepth>();
pub const TRADE_SIZE: usize = std::mem::size_of::<RawTrade>();

/// Minimum segment length the decoder accepts.
pub const SEGMENT_SIZE: usize = DEPTH_SIZE + TRADE_RING_CAPACITY * TRADE_SIZE;

const _: () = assert!(DEPTH_SIZE == 336);
const _: () = assert!(TRADE_SIZE == 72);
const _: () = assert!(SEGMENT_SIZE == std::mem::size_of::<RawSegment>());

impl RawTrade {
    /// Build a slot the way the producer writes it. Identifiers longer than
    /// the slot are truncated without a terminator.
    pub fn new(
        price: f64,
        quantity: f64,
        exchange_ts: u64,
        local_ts: u64,
        trade_id: &str,
        is_buyer_maker: bool,
    ) -> Self {
        let mut id = [0u8; TRADE_ID_LEN];
        let src = trade_id.as_bytes();
        let n = src.len().min(TRADE_ID_LEN);
        id[..n].copy_from_slice(&src[..n]);

        Self {
            price,
            quantity,
            exchange_ts,
            local_ts,
            trade_id: id,
            is_buyer_maker: is_buyer_maker as u8,
            _padding: [0; 7],
        }
    }
}

impl RawSegment {
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}
