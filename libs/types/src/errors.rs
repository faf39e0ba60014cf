//! Error types for the market data core
//!
//! None of these are fatal to the process. Segment and decode failures are
//! absorbed by the tick pipeline, empty books only suppress position marks,
//! and unresponsive subscribers are evicted individually.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedError {
    /// The producer has not created the segment (yet).
    #[error("Segment unavailable: {path}")]
    SegmentUnavailable { path: String },

    /// The segment exists but cannot be read as a snapshot.
    #[error("Decode failure for {path}: {reason}")]
    DecodeFailure { path: String, reason: String },

    /// One or both book sides have no usable levels.
    #[error("Empty book side for {instrument}")]
    EmptyBook { instrument: String },

    /// A subscriber mailbox stayed full for too many consecutive ticks.
    #[error("Subscriber {subscriber_id} unresponsive for {full_ticks} ticks")]
    SubscriberUnresponsive { subscriber_id: u64, full_ticks: u32 },
}

impl FeedError {
    /// Whether the error only means the producer is not running yet.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, FeedError::SegmentUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_unavailable_display() {
        let err = FeedError::SegmentUnavailable {
            path: "/dev/shm/okx_market_data/OKX_BTC_USDT".to_string(),
        };
        assert!(err.to_string().contains("OKX_BTC_USDT"));
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_decode_failure_display() {
        let err = FeedError::DecodeFailure {
            path: "seg".to_string(),
            reason: "segment is 12 bytes, need 1056".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Decode failure for seg: segment is 12 bytes, need 1056"
        );
        assert!(!err.is_unavailable());
    }

    #[test]
    fn test_subscriber_unresponsive_display() {
        let err = FeedError::SubscriberUnresponsive {
            subscriber_id: 7,
            full_ticks: 50,
        };
        assert_eq!(err.to_string(), "Subscriber 7 unresponsive for 50 ticks");
    }
}
