//! # Event Store
//! Time-bounded, content-addressed cache of classified events.
//!
//! One `RwLock<HashMap>` with short critical sections:
//! - readers get clones (`lookup`, `all_live`), never a live view;
//! - writers replace or patch whole records under the write lock;
//! - eviction takes the same write lock, so it never interleaves with an
//!   in-flight update of the same record.
//!
//! No lock is held across an `.await`.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use metrics::{counter, gauge};
use parking_lot::RwLock;

use crate::event::EventRecord;

#[derive(Debug, Default)]
pub struct EventStore {
    inner: RwLock<HashMap<String, EventRecord>>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn lookup(&self, id: &str) -> Option<EventRecord> {
        self.inner.read().get(id).cloned()
    }

    /// Insert or overwrite by id.
    pub fn upsert(&self, record: EventRecord) {
        let mut map = self.inner.write();
        map.insert(record.id.clone(), record);
        gauge!("store_records").set(map.len() as f64);
    }

    /// Insert when absent. When another writer got there first, keep its
    /// identity, category and timestamp and adopt only the new confidence.
    /// Returns the record as stored and whether this call inserted it.
    pub fn insert_or_refresh(&self, record: EventRecord) -> (EventRecord, bool) {
        let mut map = self.inner.write();
        let (stored, inserted) = match map.get_mut(&record.id) {
            Some(existing) => {
                existing.confidence = record.confidence;
                (existing.clone(), false)
            }
            None => {
                map.insert(record.id.clone(), record.clone());
                (record, true)
            }
        };
        gauge!("store_records").set(map.len() as f64);
        (stored, inserted)
    }

    /// Set the confidence of an existing record. Returns the updated record,
    /// or `None` if it was evicted meanwhile.
    pub fn refresh_confidence(&self, id: &str, confidence: u8) -> Option<EventRecord> {
        let mut map = self.inner.write();
        let rec = map.get_mut(id)?;
        rec.confidence = confidence.min(100);
        Some(rec.clone())
    }

    /// Copy of every record, safe to scan while writers proceed.
    pub fn all_live(&self) -> Vec<EventRecord> {
        self.inner.read().values().cloned().collect()
    }

    /// Evict records older than `max_age_secs` relative to the wall clock.
    pub fn evict_older_than(&self, max_age_secs: u64) -> usize {
        self.evict_older_than_at(now_secs(), max_age_secs)
    }

    /// Evict records with `now - timestamp > max_age_secs`. Non-finite
    /// timestamps are evicted too. Returns how many were removed.
    pub fn evict_older_than_at(&self, now: f64, max_age_secs: u64) -> usize {
        let max_age = max_age_secs as f64;
        let mut map = self.inner.write();
        let before = map.len();
        map.retain(|_, r| r.timestamp.is_finite() && now - r.timestamp <= max_age);
        let evicted = before - map.len();
        gauge!("store_records").set(map.len() as f64);
        counter!("store_evicted_total").increment(evicted as u64);
        evicted
    }

    /// Write all records as a JSON array via temp file + rename.
    pub fn save_snapshot(&self, path: &Path) -> Result<usize> {
        let records = self.all_live();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating snapshot dir {}", dir.display()))?;
        }
        let json = serde_json::to_vec(&records).context("serializing snapshot")?;
        let tmp = path.with_extension("json.tmp");
        let mut f = fs::File::create(&tmp)
            .with_context(|| format!("creating {}", tmp.display()))?;
        f.write_all(&json)?;
        f.sync_all()?;
        fs::rename(&tmp, path).with_context(|| format!("renaming onto {}", path.display()))?;
        Ok(records.len())
    }

    /// Load a snapshot written by [`save_snapshot`](Self::save_snapshot).
    /// Entries that do not parse are skipped. Returns the number loaded.
    pub fn load_snapshot(&self, path: &Path) -> Result<usize> {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let entries: Vec<serde_json::Value> =
            serde_json::from_slice(&bytes).context("snapshot is not a JSON array")?;

        let mut loaded = 0usize;
        let mut map = self.inner.write();
        for entry in entries {
            match serde_json::from_value::<EventRecord>(entry) {
                Ok(rec) if rec.is_well_formed() => {
                    map.insert(rec.id.clone(), rec);
                    loaded += 1;
                }
                Ok(rec) => tracing::warn!(id = %rec.id, "skipping malformed snapshot record"),
                Err(e) => tracing::warn!(error = %e, "skipping unreadable snapshot record"),
            }
        }
        gauge!("store_records").set(map.len() as f64);
        Ok(loaded)
    }
}

pub(crate) fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1_000.0
}
