//! Market Data Service
//!
//! Reads producer-written depth snapshots from shared memory and fans them
//! out to WebSocket subscribers on a fixed cadence:
//! - Segment location and per-tick read-only mapping
//! - Fixed-layout snapshot decoding with sentinel filtering
//! - Position marking and risk recomputation (via `risk-engine`)
//! - Broadcast hub with bounded per-subscriber mailboxes
//! - Subscriber sessions with per-session instrument selection
//!
//! # Architecture
//!
//! ```text
//!   Timer tick (coalescing)
//!        │
//!   ┌────▼────┐
//!   │ Segment │  ← re-opened every tick, read-only
//!   └────┬────┘
//!   ┌────▼────┐
//!   │ Decoder │  ← structural decode, sentinel filter
//!   └────┬────┘
//!   ┌────▼────┐
//!   │  Risk   │  ← mid-price mark, full risk recompute
//!   └────┬────┘
//!   ┌────▼────┐
//!   │   Hub   │  ← one payload per instrument, per-subscriber mailbox
//!   └────┬────┘
//!   ┌────▼─────┐
//!   │ Sessions │
//!   └──────────┘
//! ```

pub mod layout;
pub mod decoder;
pub mod segment;
pub mod backpressure;
pub mod message;
pub mod metrics;
pub mod hub;
pub mod session;
pub mod pipeline;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
