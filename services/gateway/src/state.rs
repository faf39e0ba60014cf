use market_data::hub::BroadcastHub;
use market_data::metrics::ServiceMetrics;
use market_data::segment::SegmentLocator;
use risk_engine::engine::PortfolioView;
use std::sync::Arc;
use tokio::sync::watch;

/// Shared handler state. Everything here is read-only from the handlers'
/// point of view; the tick driver owns the engine.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<BroadcastHub>,
    pub locator: SegmentLocator,
    pub portfolio: watch::Receiver<Arc<PortfolioView>>,
    pub metrics: Arc<ServiceMetrics>,
}

impl AppState {
    pub fn new(
        hub: Arc<BroadcastHub>,
        locator: SegmentLocator,
        portfolio: watch::Receiver<Arc<PortfolioView>>,
    ) -> Self {
        let metrics = Arc::clone(hub.metrics());
        Self {
            hub,
            locator,
            portfolio,
            metrics,
        }
    }

    /// Latest view published by the tick driver.
    pub fn portfolio(&self) -> Arc<PortfolioView> {
        Arc::clone(&self.portfolio.borrow())
    }
}
