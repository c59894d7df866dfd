use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::Settings;
use crate::store::InMemoryStore;

/// Background task that periodically drops idle day-lock slots.
pub async fn run_lock_pruner(store: Arc<InMemoryStore>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let pruned = store.prune_locks();
        if pruned > 0 {
            tracing::debug!("pruned {pruned} idle lock slots");
        }
    }
}

/// Background task that rewrites the journal once enough appends pile up.
pub async fn run_compactor(store: Arc<InMemoryStore>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        compact_if_needed(&store, threshold).await;
    }
}

/// Compact when at least `threshold` events were appended since the last
/// compaction. Returns whether it compacted.
pub async fn compact_if_needed(store: &InMemoryStore, threshold: u64) -> bool {
    let appended = store.journal_appends_since_compact().await;
    if appended == 0 || appended < threshold {
        return false;
    }
    match store.compact_journal().await {
        Ok(()) => {
            info!("compacted journal after {appended} appends");
            true
        }
        Err(e) => {
            tracing::error!("journal compaction failed: {e}");
            false
        }
    }
}

/// Spawn the pruner and compactor for `store` on the current runtime.
pub fn spawn(store: Arc<InMemoryStore>, settings: &Settings) {
    tokio::spawn(run_lock_pruner(store.clone(), settings.lock_prune_interval));
    tokio::spawn(run_compactor(store, settings.compact_threshold));
}
