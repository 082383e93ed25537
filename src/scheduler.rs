// src/scheduler.rs
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use metrics::gauge;
use tokio::task::JoinHandle;

use crate::store::{now_secs, EventStore};

#[derive(Clone, Debug)]
pub struct SweepCfg {
    pub interval: Duration,
    pub retention_secs: u64,
    /// Persist the store here after each sweep.
    pub snapshot_path: Option<PathBuf>,
}

/// One sweep: evict expired records, then persist if configured.
/// Returns the number of evicted records.
pub fn sweep_once(store: &EventStore, cfg: &SweepCfg, now: f64) -> usize {
    let evicted = store.evict_older_than_at(now, cfg.retention_secs);
    gauge!("store_last_sweep_ts").set(now);

    if let Some(path) = &cfg.snapshot_path {
        match store.save_snapshot(path) {
            Ok(n) => tracing::debug!(target: "sweep", records = n, path = %path.display(), "snapshot saved"),
            Err(e) => tracing::warn!(target: "sweep", error = ?e, "snapshot save failed"),
        }
    }

    tracing::info!(
        target: "sweep",
        evicted,
        remaining = store.len(),
        "retention sweep"
    );
    evicted
}

/// Spawn the periodic retention sweep. The first tick fires one interval
/// after start, not immediately.
pub fn spawn_eviction_sweep(store: Arc<EventStore>, cfg: SweepCfg) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + cfg.interval;
        let mut ticker = tokio::time::interval_at(start, cfg.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            sweep_once(&store, &cfg, now_secs());
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Category;
    use crate::event::EventRecord;

    fn rec(id: &str, ts: f64) -> EventRecord {
        EventRecord {
            id: id.into(),
            title: "Wildfire spreads".into(),
            url: "https://x.test".into(),
            source_name: "GDACS".into(),
            category: Category::Fire,
            timestamp: ts,
            trust_weight: 90,
            confidence: 90,
        }
    }

    #[test]
    fn sweep_evicts_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap/store.json");
        let store = EventStore::new();
        store.upsert(rec("old", 0.0));
        store.upsert(rec("new", 90_000.0));

        let cfg = SweepCfg {
            interval: Duration::from_secs(3600),
            retention_secs: 3600,
            snapshot_path: Some(path.clone()),
        };
        assert_eq!(sweep_once(&store, &cfg, 90_500.0), 1);

        let reloaded = EventStore::new();
        assert_eq!(reloaded.load_snapshot(&path).unwrap(), 1);
        assert!(reloaded.lookup("new").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_sweep_runs_on_interval() {
        let store = Arc::new(EventStore::new());
        store.upsert(rec("ancient", 1.0));
        let handle = spawn_eviction_sweep(
            Arc::clone(&store),
            SweepCfg {
                interval: Duration::from_secs(60),
                retention_secs: 3600,
                snapshot_path: None,
            },
        );

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.len(), 1);
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(store.is_empty());
        handle.abort();
    }
}
