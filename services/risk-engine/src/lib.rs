//! Risk Engine Service
//!
//! Marks tracked positions to the book mid price and recomputes the
//! account risk aggregate from scratch after every change.
//!
//! The engine is single-writer: the market data tick driver owns it and
//! publishes read-only [`engine::PortfolioView`] copies to everyone else.

pub mod exposure;
pub mod margin;
pub mod engine;
pub mod source;
