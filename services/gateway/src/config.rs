use clap::Parser;
use market_data::backpressure::DropPolicy;
use market_data::hub::HubConfig;
use market_data::segment::SegmentConfig;
use risk_engine::engine::RiskEngineConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use types::risk::AccountState;

/// Command-line flags, each with an environment variable fallback.
#[derive(Debug, Clone, Parser)]
#[command(name = "gateway", version, about = "Market data fan-out gateway")]
pub struct Config {
    #[arg(long, env = "GATEWAY_BIND", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    #[arg(long, env = "SHM_MOUNT", default_value = "/dev/shm")]
    pub shm_mount: PathBuf,

    #[arg(long, env = "SHM_DIR", default_value = "okx_market_data")]
    pub shm_dir: String,

    #[arg(long, env = "EXCHANGE_PREFIX", default_value = "OKX")]
    pub exchange_prefix: String,

    #[arg(long, env = "DEFAULT_INSTRUMENT", default_value = "BTC-USDT")]
    pub default_instrument: String,

    #[arg(long, env = "TICK_INTERVAL_MS", default_value_t = 100)]
    pub tick_interval_ms: u64,

    #[arg(long, env = "SUBSCRIBER_QUEUE_CAPACITY", default_value_t = 32)]
    pub queue_capacity: usize,

    /// `drop-oldest` or `disconnect`
    #[arg(long, env = "SUBSCRIBER_DROP_POLICY", default_value = "drop-oldest")]
    pub drop_policy: DropPolicy,

    #[arg(long, env = "SUBSCRIBER_MAX_FULL_TICKS", default_value_t = 50)]
    pub max_full_ticks: u32,

    #[arg(long, env = "MARGIN_RATE", default_value_t = 0.1)]
    pub margin_rate: f64,

    #[arg(long, env = "TOTAL_EQUITY", default_value_t = 0.0)]
    pub total_equity: f64,

    /// Account endpoint; when set, positions are polled from it.
    #[arg(long, env = "POSITION_SOURCE_URL")]
    pub position_source_url: Option<String>,

    #[arg(long, env = "EXCHANGE_API_KEY", hide_env_values = true)]
    pub exchange_api_key: Option<String>,

    #[arg(long, env = "POSITION_REFRESH_SECS", default_value_t = 5)]
    pub position_refresh_secs: u64,
}

impl Config {
    pub fn segment_config(&self) -> SegmentConfig {
        SegmentConfig {
            mount_point: self.shm_mount.clone(),
            directory: self.shm_dir.clone(),
            exchange_prefix: self.exchange_prefix.clone(),
        }
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            tick_interval: Duration::from_millis(self.tick_interval_ms.max(1)),
            queue_capacity: self.queue_capacity,
            drop_policy: self.drop_policy,
            max_full_ticks: self.max_full_ticks.max(1),
            default_instrument: self.default_instrument.clone(),
        }
    }

    pub fn risk_config(&self) -> RiskEngineConfig {
        RiskEngineConfig {
            margin_rate: self.margin_rate,
        }
    }

    pub fn account(&self) -> AccountState {
        AccountState::with_equity(self.total_equity)
    }

    pub fn position_refresh(&self) -> Duration {
        Duration::from_secs(self.position_refresh_secs.max(1))
    }
}
