use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::BookingEngine;

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that compacts the WAL once enough appends pile up.
pub async fn run_compactor(engine: Arc<BookingEngine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        if compact_if_needed(&engine, threshold).await {
            info!("compacted WAL");
        }
    }
}

/// Compact when appends since the last compaction reach `threshold`.
/// Returns whether a compaction ran.
pub async fn compact_if_needed(engine: &BookingEngine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if threshold == 0 || appends < threshold {
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => {
            metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
            true
        }
        Err(e) => {
            tracing::error!("WAL compaction failed after {appends} appends: {e}");
            false
        }
    }
}
