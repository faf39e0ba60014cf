//! Shared segment accessor
//!
//! Resolves the per-instrument segment path and maps it read-only. A mapping
//! lives only as long as one read; the producer can replace or recreate the
//! file between ticks without the consumer pinning the old one.

use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::trace;
use types::errors::FeedError;

use crate::decoder::{decode_segment, DecodedSegment};
use crate::layout::SEGMENT_SIZE;

/// Longest instrument identifier accepted from clients.
pub const MAX_INSTRUMENT_LEN: usize = 32;

/// Where the producer keeps its segments.
#[derive(Debug, Clone)]
pub struct SegmentConfig {
    /// tmpfs mount point, `/dev/shm` on Linux.
    pub mount_point: PathBuf,
    /// Directory under the mount point owned by the producer.
    pub directory: String,
    /// Exchange prefix of segment names, e.g. `OKX`.
    pub exchange_prefix: String,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            mount_point: PathBuf::from("/dev/shm"),
            directory: "okx_market_data".to_string(),
            exchange_prefix: "OKX".to_string(),
        }
    }
}

/// Instrument identifiers become file names, so only `[A-Za-z0-9_-]` is
/// accepted.
pub fn is_valid_instrument(instrument: &str) -> bool {
    !instrument.is_empty()
        && instrument.len() <= MAX_INSTRUMENT_LEN
        && instrument
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[derive(Debug, Clone)]
pub struct SegmentLocator {
    config: SegmentConfig,
}

impl SegmentLocator {
    pub fn new(config: SegmentConfig) -> Self {
        Self { config }
    }

    /// `{PREFIX}_{instrument with '-' replaced by '_'}`
    pub fn segment_name(&self, instrument: &str) -> String {
        format!("{}_{}", self.config.exchange_prefix, instrument.replace('-', "_"))
    }

    /// `{mount}/{directory}/{segment_name}`
    pub fn path_for(&self, instrument: &str) -> PathBuf {
        self.config
            .mount_point
            .join(&self.config.directory)
            .join(self.segment_name(instrument))
    }

    /// Map the instrument's segment read-only.
    pub fn open(&self, instrument: &str) -> Result<MappedSegment, FeedError> {
        MappedSegment::open(&self.path_for(instrument))
    }

    /// Open, decode, and release the segment in one step.
    pub fn read(&self, instrument: &str) -> Result<DecodedSegment, FeedError> {
        let segment = self.open(instrument)?;
        let decoded = segment.decode()?;
        trace!(
            instrument,
            bids = decoded.depth.bids.len(),
            asks = decoded.depth.asks.len(),
            trades = decoded.trades.len(),
            "Read segment"
        );
        Ok(decoded)
    }

    pub fn config(&self) -> &SegmentConfig {
        &self.config
    }
}

/// A read-only view of one segment, valid for a single read.
#[derive(Debug)]
pub struct MappedSegment {
    path: PathBuf,
    mmap: Mmap,
}

impl MappedSegment {
    pub fn open(path: &Path) -> Result<Self, FeedError> {
        let display = path.display().to_string();

        let file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => FeedError::SegmentUnavailable {
                path: display.clone(),
            },
            _ => FeedError::DecodeFailure {
                path: display.clone(),
                reason: e.to_string(),
            },
        })?;

        let len = file
            .metadata()
            .map_err(|e| FeedError::DecodeFailure {
                path: display.clone(),
                reason: e.to_string(),
            })?
            .len();
        if len < SEGMENT_SIZE as u64 {
            return Err(FeedError::DecodeFailure {
                path: display,
                reason: format!("segment is {len} bytes, need at least {SEGMENT_SIZE}"),
            });
        }

        // SAFETY: the mapping is read-only and never outlives this value. The
        // producer may rewrite the bytes concurrently; readers only copy plain
        // old data out of it and tolerate torn values.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| FeedError::DecodeFailure {
            path: display,
            reason: e.to_string(),
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn decode(&self) -> Result<DecodedSegment, FeedError> {
        decode_segment(self.bytes()).map_err(|e| FeedError::DecodeFailure {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::Zeroable;
    use crate::layout::{RawPriceLevel, RawSegment};
    use tempfile::TempDir;

    fn locator(dir: &TempDir) -> SegmentLocator {
        SegmentLocator::new(SegmentConfig {
            mount_point: dir.path().to_path_buf(),
            ..SegmentConfig::default()
        })
    }

    fn write_segment(locator: &SegmentLocator, instrument: &str, bytes: &[u8]) {
        let path = locator.path_for(instrument);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_path_convention() {
        let locator = SegmentLocator::new(SegmentConfig::default());
        assert_eq!(locator.segment_name("BTC-USDT"), "OKX_BTC_USDT");
        assert_eq!(
            locator.path_for("BTC-USDT-SWAP"),
            PathBuf::from("/dev/shm/okx_market_data/OKX_BTC_USDT_SWAP")
        );
    }

    #[test]
    fn test_missing_segment_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let err = locator(&dir).read("BTC-USDT").unwrap_err();
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_short_segment_is_decode_failure() {
        let dir = TempDir::new().unwrap();
        let locator = locator(&dir);
        write_segment(&locator, "BTC-USDT", &[0u8; 100]);

        let err = locator.read("BTC-USDT").unwrap_err();
        assert!(matches!(err, FeedError::DecodeFailure { .. }));
    }

    #[test]
    fn test_read_reflects_producer_rewrites() {
        let dir = TempDir::new().unwrap();
        let locator = locator(&dir);

        let mut seg = RawSegment::zeroed();
        seg.depth.bids[0] = RawPriceLevel { price: 50000.0, quantity: 1.0 };
        write_segment(&locator, "BTC-USDT", seg.as_bytes());
        assert_eq!(locator.read("BTC-USDT").unwrap().depth.best_bid(), Some(50000.0));

        seg.depth.bids[0].price = 50100.0;
        write_segment(&locator, "BTC-USDT", seg.as_bytes());
        assert_eq!(locator.read("BTC-USDT").unwrap().depth.best_bid(), Some(50100.0));
    }

    #[test]
    fn test_instrument_validation() {
        assert!(is_valid_instrument("BTC-USDT"));
        assert!(is_valid_instrument("ETH_USDT_SWAP"));
        assert!(!is_valid_instrument(""));
        assert!(!is_valid_instrument("../etc/passwd"));
        assert!(!is_valid_instrument("BTC/USDT"));
        assert!(!is_valid_instrument(&"A".repeat(MAX_INSTRUMENT_LEN + 1)));
    }
}
