mod config;
mod error;
mod handlers;
mod router;
mod state;

use clap::Parser;
use config::Config;
use market_data::hub::BroadcastHub;
use market_data::metrics::ServiceMetrics;
use market_data::pipeline::{spawn_position_refresh, TickPipeline, POSITION_FEED_CAPACITY};
use market_data::segment::SegmentLocator;
use risk_engine::engine::RiskEngine;
use risk_engine::source::{LiveExchangeSource, PositionSource, StaticPositionSource};
use router::create_router;
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();
    tracing::info!(
        bind = %config.bind,
        default_instrument = %config.default_instrument,
        "Starting market data gateway"
    );

    let locator = SegmentLocator::new(config.segment_config());
    let hub = Arc::new(BroadcastHub::new(
        config.hub_config(),
        Arc::new(ServiceMetrics::new()),
    ));

    let source = position_source(&config)?;
    tracing::info!(source = source.name(), "Position source selected");

    let engine = RiskEngine::with_placeholders(
        config.risk_config(),
        &[config.default_instrument.clone()],
        config.account(),
        types::now_millis(),
    );
    let (feed_tx, feed_rx) = mpsc::channel(POSITION_FEED_CAPACITY);
    let (pipeline, portfolio) = TickPipeline::new(locator.clone(), engine, Arc::clone(&hub));

    spawn_position_refresh(source, config.position_refresh(), feed_tx);
    tokio::spawn(pipeline.with_position_feed(feed_rx).run());

    let app = create_router(AppState::new(hub, locator, portfolio));

    let listener = TcpListener::bind(config.bind).await?;
    tracing::info!("Listening on {}", config.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

/// A configured account endpoint selects the live source; otherwise
/// positions come from configuration.
fn position_source(config: &Config) -> Result<Arc<dyn PositionSource>, anyhow::Error> {
    match &config.position_source_url {
        Some(url) => Ok(Arc::new(LiveExchangeSource::new(
            url.clone(),
            config.exchange_api_key.clone(),
            Duration::from_secs(10),
        )?)),
        None => Ok(Arc::new(StaticPositionSource::placeholders(
            &[config.default_instrument.clone()],
            config.account(),
            types::now_millis(),
        ))),
    }
}
