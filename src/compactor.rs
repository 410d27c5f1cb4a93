use std::time::Duration;

use tracing::{info, warn};

use crate::ledger::Ledger;

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that compacts the WAL once enough appends pile up.
pub async fn run_compactor(ledger: Ledger, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_needed(&ledger, threshold).await;
    }
}

/// Returns whether a compaction ran.
pub async fn compact_if_needed(ledger: &Ledger, threshold: u64) -> bool {
    let appends = ledger.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match ledger.compact_wal().await {
        Ok(()) => {
            info!("compacted WAL after {appends} appends");
            true
        }
        Err(e) => {
            warn!("WAL compaction failed: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerOptions;
    use crate::model::*;

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let dir = std::env::temp_dir().join("roomledger_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("threshold.wal");
        let _ = std::fs::remove_file(&path);

        let ledger = Ledger::open(&path, LedgerOptions::default()).unwrap();
        ledger
            .create_room(Room {
                id: 1,
                name: "Library".into(),
                capacity: 2,
                description: String::new(),
            })
            .await
            .unwrap();

        assert!(!compact_if_needed(&ledger, 3).await);
        for i in 0..3 {
            ledger
                .try_commit(BookingRequest {
                    room_id: 1,
                    requester_id: 1,
                    title: "focus".into(),
                    start: i * 1000,
                    end: i * 1000 + 500,
                })
                .await
                .unwrap();
        }
        assert!(compact_if_needed(&ledger, 3).await);
        assert_eq!(ledger.wal_appends_since_compact().await, 0);
        assert_eq!(ledger.bookings().await.len(), 3);
    }
}
