//! Tick pipeline
//!
//! The single owner of engine state. Each tick runs
//! read → decode → recompute → compose → deliver, then publishes a
//! read-only [`PortfolioView`] for the query surface. Position refreshes
//! arrive over a channel and are applied at the start of the next tick.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use risk_engine::engine::{PortfolioView, RiskEngine};
use risk_engine::source::{PortfolioFeed, PositionSource};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use types::errors::FeedError;

use crate::decoder::DecodedSegment;
use crate::hub::{BroadcastHub, DeliveryReport};
use crate::message::{DataStatus, MarketUpdate};
use crate::metrics::ServiceMetrics;
use crate::segment::SegmentLocator;

/// Minimum spacing of repeated "segment unavailable" notices per instrument.
pub const UNAVAILABLE_NOTICE_INTERVAL: Duration = Duration::from_secs(30);

/// Capacity of the position feed channel.
pub const POSITION_FEED_CAPACITY: usize = 8;

/// Rate-limits per-instrument read failure logs.
#[derive(Debug)]
pub struct NoticeThrottle {
    interval: Duration,
    last_notice: BTreeMap<String, Instant>,
}

impl NoticeThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_notice: BTreeMap::new(),
        }
    }

    /// Whether a failure notice for `instrument` is due at `now`.
    pub fn should_notify(&mut self, instrument: &str, now: Instant) -> bool {
        match self.last_notice.get(instrument) {
            Some(last) if now.duration_since(*last) < self.interval => false,
            _ => {
                self.last_notice.insert(instrument.to_string(), now);
                true
            }
        }
    }

    /// Clear the failure state. Returns true if a failure had been noticed,
    /// so recovery is reported once.
    pub fn recovered(&mut self, instrument: &str) -> bool {
        self.last_notice.remove(instrument).is_some()
    }

    /// Forget every instrument outside `keep`.
    pub fn retain(&mut self, keep: &BTreeSet<String>) {
        self.last_notice.retain(|instrument, _| keep.contains(instrument));
    }

    pub fn len(&self) -> usize {
        self.last_notice.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_notice.is_empty()
    }
}

/// Summary of one tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub sequence: u64,
    /// Status of every instrument read this tick.
    pub statuses: BTreeMap<String, DataStatus>,
    pub subscribers: usize,
    pub delivery: DeliveryReport,
}

pub struct TickPipeline {
    locator: SegmentLocator,
    engine: RiskEngine,
    hub: Arc<BroadcastHub>,
    metrics: Arc<ServiceMetrics>,
    /// Last successfully decoded segment per instrument.
    cache: BTreeMap<String, DecodedSegment>,
    notices: NoticeThrottle,
    sequence: u64,
    view_tx: watch::Sender<Arc<PortfolioView>>,
    feed_rx: Option<mpsc::Receiver<PortfolioFeed>>,
}

impl TickPipeline {
    /// Build a pipeline and the receiver for its published views.
    pub fn new(
        locator: SegmentLocator,
        engine: RiskEngine,
        hub: Arc<BroadcastHub>,
    ) -> (Self, watch::Receiver<Arc<PortfolioView>>) {
        let (view_tx, view_rx) = watch::channel(Arc::new(engine.view()));
        let metrics = Arc::clone(hub.metrics());

        let pipeline = Self {
            locator,
            engine,
            hub,
            metrics,
            cache: BTreeMap::new(),
            notices: NoticeThrottle::new(UNAVAILABLE_NOTICE_INTERVAL),
            sequence: 0,
            view_tx,
            feed_rx: None,
        };
        (pipeline, view_rx)
    }

    /// Apply position refreshes received on `rx` at the start of each tick.
    pub fn with_position_feed(mut self, rx: mpsc::Receiver<PortfolioFeed>) -> Self {
        self.feed_rx = Some(rx);
        self
    }

    pub fn engine(&self) -> &RiskEngine {
        &self.engine
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Run one full tick.
    pub fn run_tick(&mut self) -> TickReport {
        let started = Instant::now();
        self.drain_position_feed();

        let roster = self.hub.roster();
        let subscribed = roster.instruments();
        let mut instruments: BTreeSet<String> = subscribed.clone();
        instruments.extend(self.engine.instruments().map(str::to_string));

        let statuses: BTreeMap<String, DataStatus> = instruments
            .iter()
            .map(|instrument| {
                let status = self.refresh_instrument(instrument, started);
                (instrument.clone(), status)
            })
            .collect();
        self.forget_unread(&instruments);

        let view = Arc::new(self.engine.view());
        self.view_tx.send_replace(Arc::clone(&view));

        self.sequence += 1;
        let timestamp = types::now_millis();
        let mut payloads = BTreeMap::new();
        for instrument in &subscribed {
            let status = statuses
                .get(instrument)
                .copied()
                .unwrap_or(DataStatus::Unavailable);
            let update = MarketUpdate::compose(
                self.sequence,
                timestamp,
                instrument,
                status,
                self.cache.get(instrument),
                &view,
            );
            match update.to_outbound() {
                Ok(message) => {
                    payloads.insert(instrument.clone(), message);
                }
                Err(e) => error!(instrument = %instrument, error = %e, "Failed to serialize update"),
            }
        }

        let delivery = self.hub.deliver(&roster, &payloads);
        self.metrics
            .record_tick(started.elapsed().as_micros() as u64);

        debug!(
            sequence = self.sequence,
            subscribers = roster.len(),
            delivered = delivery.delivered,
            dropped = delivery.dropped,
            "Tick composed"
        );

        TickReport {
            sequence: self.sequence,
            statuses,
            subscribers: roster.len(),
            delivery,
        }
    }

    /// Read one instrument's segment and mark its position.
    fn refresh_instrument(&mut self, instrument: &str, now: Instant) -> DataStatus {
        match self.locator.read(instrument) {
            Ok(decoded) => {
                if self.notices.recovered(instrument) {
                    info!(instrument, "Segment readable again");
                }
                if let Err(e) =
                    self.engine
                        .apply_depth(instrument, &decoded.depth, types::now_millis())
                {
                    self.metrics.record_empty_book();
                    debug!(instrument, error = %e, "Skipping position mark");
                }
                self.cache.insert(instrument.to_string(), decoded);
                DataStatus::Live
            }
            Err(e) => {
                self.record_read_failure(instrument, &e, now);
                if self.cache.contains_key(instrument) {
                    DataStatus::Stale
                } else {
                    DataStatus::Unavailable
                }
            }
        }
    }

    /// Drop cached snapshots and notice state of instruments that are
    /// neither subscribed nor tracked, so a later reselection starts clean.
    fn forget_unread(&mut self, read: &BTreeSet<String>) {
        self.cache.retain(|instrument, _| read.contains(instrument));
        self.notices.retain(read);
    }

    fn record_read_failure(&mut self, instrument: &str, err: &FeedError, now: Instant) {
        if err.is_unavailable() {
            self.metrics.record_segment_unavailable();
        } else {
            self.metrics.record_decode_failure();
        }

        if self.notices.should_notify(instrument, now) {
            warn!(instrument, error = %err, "Segment read failed");
        }
    }

    fn drain_position_feed(&mut self) {
        let Some(rx) = self.feed_rx.as_mut() else {
            return;
        };

        while let Ok(feed) = rx.try_recv() {
            if let Some(positions) = feed.positions {
                debug!(count = positions.len(), "Replacing positions");
                self.engine.replace_positions(positions);
            }
            if let Some(account) = feed.account {
                self.engine.apply_account(account);
            }
        }
    }

    /// Drive ticks forever on a fixed wall-clock interval.
    ///
    /// Ticks that fall due while one is still running are skipped, never
    /// queued.
    pub async fn run(mut self) {
        let period = self.hub.config().tick_interval;
        let metrics = Arc::clone(&self.metrics);

        info!(tick_interval_ms = period.as_millis() as u64, "Tick driver started");

        drive(period, &metrics, || {
            self.run_tick();
            std::future::ready(())
        })
        .await;
    }
}

/// Await `step` once per `period`, forever.
///
/// A step that overruns one or more periods is followed by exactly one
/// immediate step; the missed periods are counted in `metrics`.
pub(crate) async fn drive<F, Fut>(period: Duration, metrics: &ServiceMetrics, mut step: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut previous: Option<Instant> = None;
    loop {
        let scheduled = interval.tick().await;
        if let Some(prev) = previous {
            let skipped = skipped_ticks(scheduled.duration_since(prev), period);
            if skipped > 0 {
                metrics.record_ticks_skipped(skipped);
                debug!(skipped, "Coalesced overdue ticks");
            }
        }
        previous = Some(scheduled);

        step().await;
    }
}

/// Ticks skipped between two scheduled instants `gap` apart.
fn skipped_ticks(gap: Duration, period: Duration) -> u64 {
    if period.is_zero() {
        return 0;
    }
    ((gap.as_nanos() / period.as_nanos()) as u64).saturating_sub(1)
}

/// Poll `source` and forward each successful fetch to the pipeline.
///
/// Non-live sources are fetched once. Fetch failures are logged and leave
/// the engine's state untouched.
pub fn spawn_position_refresh(
    source: Arc<dyn PositionSource>,
    period: Duration,
    tx: mpsc::Sender<PortfolioFeed>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            match source.fetch().await {
                Ok(feed) => {
                    if tx.send(feed).await.is_err() {
                        debug!(source = source.name(), "Pipeline gone, stopping position refresh");
                        return;
                    }
                    if !source.is_live() {
                        return;
                    }
                }
                Err(e) => warn!(source = source.name(), error = %e, "Position refresh failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::HubConfig;
    use crate::layout::{RawPriceLevel, RawSegment};
    use crate::segment::SegmentConfig;
    use bytemuck::Zeroable;
    use risk_engine::engine::RiskEngineConfig;
    use risk_engine::source::StaticPositionSource;
    use tempfile::TempDir;
    use types::position::Position;
    use types::risk::AccountState;

    fn setup(dir: &TempDir) -> (TickPipeline, watch::Receiver<Arc<PortfolioView>>, Arc<BroadcastHub>) {
        let locator = SegmentLocator::new(SegmentConfig {
            mount_point: dir.path().to_path_buf(),
            ..SegmentConfig::default()
        });
        let engine = RiskEngine::with_placeholders(
            RiskEngineConfig::default(),
            &["BTC-USDT".to_string()],
            AccountState::default(),
            0,
        );
        let hub = Arc::new(BroadcastHub::new(
            HubConfig::default(),
            Arc::new(ServiceMetrics::new()),
        ));
        let (pipeline, view_rx) = TickPipeline::new(locator, engine, Arc::clone(&hub));
        (pipeline, view_rx, hub)
    }

    fn write_book(dir: &TempDir, bid: f64, ask: f64) {
        write_book_for(dir, "BTC-USDT", bid, ask);
    }

    fn write_book_for(dir: &TempDir, instrument: &str, bid: f64, ask: f64) {
        let mut seg = RawSegment::zeroed();
        seg.depth.bids[0] = RawPriceLevel { price: bid, quantity: 1.0 };
        seg.depth.asks[0] = RawPriceLevel { price: ask, quantity: 1.0 };
        let path = dir
            .path()
            .join("okx_market_data")
            .join(format!("OKX_{}", instrument.replace('-', "_")));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, seg.as_bytes()).unwrap();
    }

    #[test]
    fn test_notice_throttle() {
        let mut throttle = NoticeThrottle::new(Duration::from_secs(30));
        let t0 = Instant::now();

        assert!(throttle.should_notify("BTC-USDT", t0));
        assert!(!throttle.should_notify("BTC-USDT", t0 + Duration::from_secs(10)));
        assert!(throttle.should_notify("ETH-USDT", t0));
        assert!(throttle.should_notify("BTC-USDT", t0 + Duration::from_secs(31)));

        assert!(throttle.recovered("BTC-USDT"));
        assert!(!throttle.recovered("BTC-USDT"));
    }

    #[test]
    fn test_skipped_ticks() {
        let period = Duration::from_millis(100);
        assert_eq!(skipped_ticks(Duration::from_millis(100), period), 0);
        assert_eq!(skipped_ticks(Duration::from_millis(300), period), 2);
        assert_eq!(skipped_ticks(Duration::ZERO, period), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrunning_tick_is_coalesced() {
        let metrics = ServiceMetrics::new();
        let origin = Instant::now();
        let mut starts = Vec::new();

        // The second step takes 2.5 periods; deadlines at 200ms and 300ms pass
        // while it runs.
        let driven = tokio::time::timeout(
            Duration::from_millis(550),
            drive(Duration::from_millis(100), &metrics, || {
                starts.push(origin.elapsed());
                let work = if starts.len() == 2 {
                    Duration::from_millis(250)
                } else {
                    Duration::ZERO
                };
                tokio::time::sleep(work)
            }),
        )
        .await;
        assert!(driven.is_err());

        let starts_ms: Vec<u128> = starts.iter().map(Duration::as_millis).collect();
        assert_eq!(starts_ms, vec![0, 100, 350, 400, 500]);
        assert!(metrics.export()["ticks_skipped"] > 0);
    }

    #[tokio::test]
    async fn test_tick_marks_position_and_publishes_view() {
        let dir = TempDir::new().unwrap();
        let (mut pipeline, view_rx, _hub) = setup(&dir);
        write_book(&dir, 50000.0, 50010.0);

        let report = pipeline.run_tick();

        assert_eq!(report.sequence, 1);
        assert_eq!(report.statuses["BTC-USDT"], DataStatus::Live);
        let view = view_rx.borrow().clone();
        assert_eq!(view.position("BTC-USDT").unwrap().current_price, 50005.0);
    }

    #[tokio::test]
    async fn test_failed_read_replays_cached_snapshot() {
        let dir = TempDir::new().unwrap();
        let (mut pipeline, _view_rx, hub) = setup(&dir);
        let sub = hub.register();

        write_book(&dir, 50000.0, 50010.0);
        pipeline.run_tick();
        std::fs::remove_dir_all(dir.path().join("okx_market_data")).unwrap();
        let report = pipeline.run_tick();

        assert_eq!(report.statuses["BTC-USDT"], DataStatus::Stale);
        sub.try_next();
        let second: MarketUpdate = serde_json::from_str(&sub.try_next().unwrap().payload).unwrap();
        assert_eq!(second.status, DataStatus::Stale);
        assert_eq!(second.depth.unwrap().bids[0].price, 50000.0);
        assert_eq!(hub.metrics().export()["segment_unavailable"], 1);
    }

    #[tokio::test]
    async fn test_cycled_instruments_leave_no_state_behind() {
        let dir = TempDir::new().unwrap();
        let (mut pipeline, _view_rx, hub) = setup(&dir);
        let sub = hub.register();
        write_book(&dir, 50000.0, 50010.0);

        for i in 0..2000 {
            sub.handle_control(&format!(r#"{{"instrument":"JUNK-{i}"}}"#)).unwrap();
            let report = pipeline.run_tick();
            assert_eq!(report.statuses[&format!("JUNK-{i}")], DataStatus::Unavailable);
            while sub.try_next().is_some() {}

            assert!(pipeline.notices.len() <= 1);
            assert!(pipeline.cache.len() <= 1);
        }
        assert!(hub.is_registered(sub.id()));
        assert_eq!(hub.metrics().export()["segment_unavailable"], 2000);
    }

    #[tokio::test]
    async fn test_deselected_instrument_not_replayed() {
        let dir = TempDir::new().unwrap();
        let (mut pipeline, _view_rx, hub) = setup(&dir);
        let sub = hub.register();
        write_book(&dir, 50000.0, 50010.0);
        write_book_for(&dir, "OLD-COIN", 1.0, 1.1);

        sub.handle_control(r#"{"instrument":"OLD-COIN"}"#).unwrap();
        pipeline.run_tick();
        assert!(pipeline.cache.contains_key("OLD-COIN"));

        sub.handle_control(r#"{"instrument":"BTC-USDT"}"#).unwrap();
        pipeline.run_tick();
        assert!(!pipeline.cache.contains_key("OLD-COIN"));

        // The producer for OLD-COIN goes away while nobody watches it.
        std::fs::remove_file(dir.path().join("okx_market_data").join("OKX_OLD_COIN")).unwrap();
        sub.handle_control(r#"{"instrument":"OLD-COIN"}"#).unwrap();
        while sub.try_next().is_some() {}
        let report = pipeline.run_tick();

        assert_eq!(report.statuses["OLD-COIN"], DataStatus::Unavailable);
        let update: MarketUpdate = serde_json::from_str(&sub.try_next().unwrap().payload).unwrap();
        assert_eq!(update.status, DataStatus::Unavailable);
        assert!(update.depth.is_none());
    }

    #[tokio::test]
    async fn test_position_feed_applied_before_tick() {
        let dir = TempDir::new().unwrap();
        let (pipeline, view_rx, _hub) = setup(&dir);
        let (tx, rx) = mpsc::channel(POSITION_FEED_CAPACITY);
        let mut pipeline = pipeline.with_position_feed(rx);

        tx.send(PortfolioFeed {
            positions: Some(vec![Position::open("BTC-USDT", 2.0, 49000.0, 0)]),
            account: Some(AccountState::with_equity(100_000.0)),
        })
        .await
        .unwrap();
        write_book(&dir, 50000.0, 50010.0);
        pipeline.run_tick();

        let view = view_rx.borrow().clone();
        let pos = view.position("BTC-USDT").unwrap();
        assert_eq!(pos.unrealized_pnl, 2.0 * (50005.0 - 49000.0));
        assert_eq!(view.risk_metrics.total_equity, 100_000.0);
    }

    #[tokio::test]
    async fn test_static_source_refreshes_once() {
        let source: Arc<dyn PositionSource> = Arc::new(StaticPositionSource::new(
            vec![Position::placeholder("ETH-USDT", 0)],
            AccountState::with_equity(5.0),
        ));
        let (tx, mut rx) = mpsc::channel(POSITION_FEED_CAPACITY);

        let handle = spawn_position_refresh(source, Duration::from_millis(10), tx);
        handle.await.unwrap();

        let feed = rx.recv().await.unwrap();
        assert_eq!(feed.positions.unwrap()[0].instrument, "ETH-USDT");
        assert!(rx.recv().await.is_none());
    }
}
