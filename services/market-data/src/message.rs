//! Outbound broadcast message

use std::sync::Arc;

use risk_engine::engine::PortfolioView;
use serde::{Deserialize, Serialize};
use types::market::{MarketDepth, PublicTrade};
use types::position::Position;
use types::risk::RiskMetrics;

use crate::backpressure::OutboundMessage;
use crate::decoder::DecodedSegment;

pub const MARKET_UPDATE: &str = "market_update";

/// Freshness of the market part of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataStatus {
    /// Decoded on this tick.
    Live,
    /// This tick's read failed; last good snapshot replayed.
    Stale,
    /// Nothing has been decoded for the instrument yet.
    Unavailable,
}

/// One broadcast payload for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketUpdate {
    #[serde(rename = "type")]
    pub kind: String,
    pub sequence: u64,
    pub status: DataStatus,
    /// Epoch-ms at composition.
    pub timestamp: i64,
    pub depth: Option<MarketDepth>,
    pub trades: Vec<PublicTrade>,
    pub positions: Vec<Position>,
    pub risk_metrics: RiskMetrics,
}

impl MarketUpdate {
    /// Compose from the instrument's latest decoded segment (if any) and the
    /// engine's current view. `segment` is ignored when `status` is
    /// [`DataStatus::Unavailable`].
    pub fn compose(
        sequence: u64,
        timestamp: i64,
        instrument: &str,
        status: DataStatus,
        segment: Option<&DecodedSegment>,
        view: &PortfolioView,
    ) -> Self {
        let segment = segment.filter(|_| status != DataStatus::Unavailable);

        Self {
            kind: MARKET_UPDATE.to_string(),
            sequence,
            status,
            timestamp,
            depth: segment.map(|s| s.depth.to_market_depth(instrument)),
            trades: segment
                .map(|s| s.trades.iter().map(|t| t.to_public(instrument)).collect())
                .unwrap_or_default(),
            positions: view.positions.clone(),
            risk_metrics: view.risk_metrics,
        }
    }

    /// Serialize once into a shareable mailbox entry.
    pub fn to_outbound(&self) -> serde_json::Result<OutboundMessage> {
        Ok(OutboundMessage {
            payload: Arc::from(serde_json::to_string(self)?),
            sequence: self.sequence,
            queued_at: self.timestamp,
        })
    }
}
