use crate::handlers::{health, market, portfolio, ws};
use crate::state::AppState;
use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health::root))
        .route("/metrics", get(health::metrics))
        .route("/market/depth/{instrument}", get(market::get_depth))
        .route("/market/trades/{instrument}", get(market::get_trades))
        .route("/positions", get(portfolio::get_positions))
        .route("/position/{instrument}", get(portfolio::get_position))
        .route("/risk", get(portfolio::get_risk))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use bytemuck::Zeroable;
    use market_data::hub::{BroadcastHub, HubConfig};
    use market_data::layout::{RawPriceLevel, RawSegment, RawTrade};
    use market_data::metrics::ServiceMetrics;
    use market_data::segment::{SegmentConfig, SegmentLocator};
    use risk_engine::engine::{RiskEngine, RiskEngineConfig};
    use serde_json::Value;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::watch;
    use tower::ServiceExt;
    use types::position::Position;
    use types::risk::AccountState;

    fn app(dir: &TempDir) -> Router {
        let locator = SegmentLocator::new(SegmentConfig {
            mount_point: dir.path().to_path_buf(),
            ..SegmentConfig::default()
        });
        let engine = RiskEngine::new(
            RiskEngineConfig::default(),
            vec![Position::open("BTC-USDT", 1.0, 50_000.0, 0)],
            AccountState::with_equity(10_000.0),
        );
        let (_tx, rx) = watch::channel(Arc::new(engine.view()));
        let hub = Arc::new(BroadcastHub::new(
            HubConfig::default(),
            Arc::new(ServiceMetrics::new()),
        ));
        create_router(AppState::new(hub, locator, rx))
    }

    fn write_segment(dir: &TempDir) {
        let mut seg = RawSegment::zeroed();
        seg.depth.exchange_ts = 1708123456789;
        seg.depth.bids[0] = RawPriceLevel { price: 50000.0, quantity: 1.2 };
        seg.depth.asks[0] = RawPriceLevel { price: 50010.0, quantity: 0.8 };
        seg.trades[0] = RawTrade::new(50005.0, 0.1, 1708123456700, 1708123456701, "T-9", false);

        let path = dir.path().join("okx_market_data").join("OKX_BTC_USDT");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, seg.as_bytes()).unwrap();
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_root() {
        let dir = TempDir::new().unwrap();
        let (status, body) = get(app(&dir), "/").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].as_str().unwrap().contains("running"));
    }

    #[tokio::test]
    async fn test_depth_reads_segment() {
        let dir = TempDir::new().unwrap();
        write_segment(&dir);

        let (status, body) = get(app(&dir), "/market/depth/BTC-USDT").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["instrument"], "BTC-USDT");
        assert_eq!(body["bids"].as_array().unwrap().len(), 1);
        assert_eq!(body["asks"][0]["price"], 50010.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_segment_reads() {
        let dir = TempDir::new().unwrap();
        write_segment(&dir);
        let app = app(&dir);

        let requests = (0..16).map(|i| {
            let uri = if i % 2 == 0 { "/market/depth/BTC-USDT" } else { "/market/trades/BTC-USDT" };
            get(app.clone(), uri)
        });
        let responses = futures::future::join_all(requests).await;

        assert!(responses.iter().all(|(status, _)| *status == StatusCode::OK));
        assert_eq!(responses[0].1["bids"][0]["price"], 50000.0);
        assert_eq!(responses[1].1[0]["trade_id"], "T-9");
    }

    #[tokio::test]
    async fn test_depth_unavailable_without_producer() {
        let dir = TempDir::new().unwrap();
        let (status, body) = get(app(&dir), "/market/depth/BTC-USDT").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "SERVICE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_trades() {
        let dir = TempDir::new().unwrap();
        write_segment(&dir);

        let (status, body) = get(app(&dir), "/market/trades/BTC-USDT").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["trade_id"], "T-9");
        assert_eq!(body[0]["instrument"], "BTC-USDT");
    }

    #[tokio::test]
    async fn test_invalid_instrument_rejected() {
        let dir = TempDir::new().unwrap();
        let (status, _) = get(app(&dir), "/market/depth/BTC.USDT").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_positions_and_risk() {
        let dir = TempDir::new().unwrap();

        let (status, positions) = get(app(&dir), "/positions").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(positions[0]["instrument"], "BTC-USDT");

        let (status, position) = get(app(&dir), "/position/BTC-USDT").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(position["quantity"], 1.0);

        let (status, risk) = get(app(&dir), "/risk").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(risk["total_equity"], 10_000.0);
    }

    #[tokio::test]
    async fn test_unknown_position_is_404() {
        let dir = TempDir::new().unwrap();
        let (status, body) = get(app(&dir), "/position/DOGE-USDT").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_metrics() {
        let dir = TempDir::new().unwrap();
        let (status, body) = get(app(&dir), "/metrics").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connected_subscribers"], 0);
        assert_eq!(body["ticks_composed"], 0);
    }
}
