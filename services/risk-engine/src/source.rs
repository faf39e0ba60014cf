//! Position sources
//!
//! The engine never asks whether credentials exist. It consumes whichever
//! [`PositionSource`] was configured at startup: a static source built from
//! configuration, or a live source polling an account endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use types::position::Position;
use types::risk::AccountState;

/// One refresh from a position source. Missing parts leave the engine's
/// current state in place.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioFeed {
    pub positions: Option<Vec<Position>>,
    pub account: Option<AccountState>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Position source request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Position source returned status {0}")]
    Status(u16),
}

#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether the source can change after startup and should be polled.
    fn is_live(&self) -> bool;

    async fn fetch(&self) -> Result<PortfolioFeed, SourceError>;
}

/// Fixed positions and account inputs taken from configuration.
#[derive(Debug, Clone)]
pub struct StaticPositionSource {
    positions: Vec<Position>,
    account: AccountState,
}

impl StaticPositionSource {
    pub fn new(positions: Vec<Position>, account: AccountState) -> Self {
        Self { positions, account }
    }

    /// Zero-state placeholder positions for each instrument.
    pub fn placeholders(instruments: &[String], account: AccountState, timestamp: i64) -> Self {
        let positions = instruments
            .iter()
            .map(|i| Position::placeholder(i.as_str(), timestamp))
            .collect();
        Self::new(positions, account)
    }
}

#[async_trait]
impl PositionSource for StaticPositionSource {
    fn name(&self) -> &'static str {
        "static"
    }

    fn is_live(&self) -> bool {
        false
    }

    async fn fetch(&self) -> Result<PortfolioFeed, SourceError> {
        Ok(PortfolioFeed {
            positions: Some(self.positions.clone()),
            account: Some(self.account),
        })
    }
}

/// Polls an account service endpoint returning a [`PortfolioFeed`] as JSON.
#[derive(Debug, Clone)]
pub struct LiveExchangeSource {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl LiveExchangeSource {
    pub fn new(url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            api_key,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PositionSource for LiveExchangeSource {
    fn name(&self) -> &'static str {
        "live"
    }

    fn is_live(&self) -> bool {
        true
    }

    async fn fetch(&self) -> Result<PortfolioFeed, SourceError> {
        let mut request = self.client.get(&self.url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let res = request.send().await?;
        if !res.status().is_success() {
            return Err(SourceError::Status(res.status().as_u16()));
        }

        Ok(res.json::<PortfolioFeed>().await?)
    }
}
