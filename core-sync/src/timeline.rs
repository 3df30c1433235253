//! Creation-time index: asset id → the first time this device saw it.

use bridge_traits::{Clock, SettingsStore};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

use crate::deferred::DeferredWriter;
use crate::error::Result;

/// Settings key holding the JSON object of creation times
pub const CREATION_TIMES_KEY: &str = "inlay_times";

pub struct CreationTimeIndex {
    settings: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    times: Mutex<BTreeMap<String, DateTime<Utc>>>,
    writer: DeferredWriter,
}

impl CreationTimeIndex {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        clock: Arc<dyn Clock>,
        persist_delay: Duration,
    ) -> Self {
        let writer = DeferredWriter::new(Arc::clone(&settings), CREATION_TIMES_KEY, persist_delay);
        Self {
            settings,
            clock,
            times: Mutex::new(BTreeMap::new()),
            writer,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, DateTime<Utc>>> {
        self.times.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Load the stored index, keeping entries already recorded in memory.
    /// Returns the number of entries.
    pub async fn load(&self) -> Result<usize> {
        let stored = match self.settings.get_string(CREATION_TIMES_KEY).await? {
            Some(text) if !text.trim().is_empty() => {
                match serde_json::from_str::<BTreeMap<String, DateTime<Utc>>>(&text) {
                    Ok(map) => map,
                    Err(e) => {
                        warn!(error = %e, "Ignoring malformed creation-time index");
                        BTreeMap::new()
                    }
                }
            }
            _ => BTreeMap::new(),
        };

        let mut times = self.lock();
        for (id, at) in stored {
            times.entry(id).or_insert(at);
        }
        debug!(entries = times.len(), "Loaded creation-time index");
        Ok(times.len())
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Creation time of `id`, the Unix epoch when unknown
    pub fn get(&self, id: &str) -> DateTime<Utc> {
        self.lock().get(id).copied().unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Record `id` as created now unless it already has a time
    pub fn touch(&self, id: &str) -> bool {
        let now = self.clock.now();
        self.set_if_absent(id, now)
    }

    /// Record a creation time; an existing entry is never replaced
    pub fn set_if_absent(&self, id: &str, at: DateTime<Utc>) -> bool {
        let mut times = self.lock();
        if times.contains_key(id) {
            return false;
        }
        times.insert(id.to_string(), at);
        self.persist_later(&times);
        true
    }

    /// Forget the given ids
    pub fn remove_many<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> usize {
        let mut times = self.lock();
        let removed = ids
            .into_iter()
            .filter(|id| times.remove(*id).is_some())
            .count();
        if removed > 0 {
            self.persist_later(&times);
        }
        removed
    }

    pub async fn flush(&self) -> Result<()> {
        self.writer.flush().await
    }

    fn persist_later(&self, times: &BTreeMap<String, DateTime<Utc>>) {
        match serde_json::to_string(times) {
            Ok(json) => self.writer.schedule(json),
            Err(e) => warn!(error = %e, "Failed to encode creation-time index"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{BridgeError, ManualClock};
    use chrono::TimeZone;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemorySettings {
        values: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl SettingsStore for MemorySettings {
        async fn set_string(&self, key: &str, value: &str) -> std::result::Result<(), BridgeError> {
            self.values.lock().unwrap().insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn get_string(&self, key: &str) -> std::result::Result<Option<String>, BridgeError> {
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        async fn delete(&self, key: &str) -> std::result::Result<(), BridgeError> {
            self.values.lock().unwrap().remove(key);
            Ok(())
        }

        async fn list_keys(&self) -> std::result::Result<Vec<String>, BridgeError> {
            Ok(self.values.lock().unwrap().keys().cloned().collect())
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_first_time_wins() {
        let clock = Arc::new(ManualClock::new(start()));
        let index = CreationTimeIndex::new(
            Arc::new(MemorySettings::default()),
            clock.clone(),
            Duration::from_secs(1),
        );

        assert!(index.touch("a"));
        clock.advance(chrono::Duration::hours(1));
        assert!(!index.touch("a"));

        assert_eq!(index.get("a"), start());
        assert_eq!(index.get("unknown"), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[tokio::test]
    async fn test_flush_and_reload() {
        let settings = Arc::new(MemorySettings::default());
        let clock = Arc::new(ManualClock::new(start()));

        let index = CreationTimeIndex::new(settings.clone(), clock.clone(), Duration::from_secs(1));
        index.touch("a");
        index.touch("b");
        assert_eq!(index.remove_many(["b", "missing"]), 1);
        index.flush().await.unwrap();

        let reloaded = CreationTimeIndex::new(settings, clock, Duration::from_secs(1));
        assert_eq!(reloaded.load().await.unwrap(), 1);
        assert_eq!(reloaded.keys(), vec!["a"]);
        assert_eq!(reloaded.get("a"), start());
    }

    #[tokio::test]
    async fn test_load_accepts_millisecond_timestamps() {
        let settings = Arc::new(MemorySettings::default());
        settings
            .set_string(CREATION_TIMES_KEY, r#"{"a":"2024-03-01T12:00:00.000Z"}"#)
            .await
            .unwrap();

        let index = CreationTimeIndex::new(
            settings,
            Arc::new(ManualClock::new(start())),
            Duration::from_secs(1),
        );
        index.load().await.unwrap();

        assert_eq!(index.get("a"), start());
    }
}
