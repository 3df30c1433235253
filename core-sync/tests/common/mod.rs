//! In-memory replicas shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    AssetPayload, AssetRecord, AssetStore, BridgeError, MediaType, RemoteObjectStore,
    SettingsStore,
};
use bytes::Bytes;
use core_auth::{StaticTokenProvider, TokenProvider};
use core_sync::{
    LocalAssets, SyncEngine, TombstoneSet, TombstoneStore, REMOTE_TOMBSTONES_KEY,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub fn record(name: &str) -> AssetRecord {
    AssetRecord {
        name: name.to_string(),
        data: AssetPayload::Binary(Bytes::from(name.as_bytes().to_vec())),
        ext: "png".to_string(),
        width: 32,
        height: 32,
        media_type: MediaType::Image,
    }
}

#[derive(Default)]
pub struct MemoryAssets {
    records: Mutex<BTreeMap<String, AssetRecord>>,
}

impl MemoryAssets {
    pub fn ids(&self) -> BTreeSet<String> {
        self.records.lock().unwrap().keys().cloned().collect()
    }

    /// Insert behind the tombstone observer's back, like a stale replica
    pub fn insert_raw(&self, id: &str) {
        self.records
            .lock()
            .unwrap()
            .insert(id.to_string(), record(id));
    }

    pub fn record(&self, id: &str) -> Option<AssetRecord> {
        self.records.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl AssetStore for MemoryAssets {
    async fn keys(&self) -> BridgeResult<Vec<String>> {
        Ok(self.records.lock().unwrap().keys().cloned().collect())
    }

    async fn get(&self, id: &str) -> BridgeResult<Option<AssetRecord>> {
        Ok(self.records.lock().unwrap().get(id).cloned())
    }

    async fn put(&self, id: &str, record: &AssetRecord) -> BridgeResult<()> {
        self.records
            .lock()
            .unwrap()
            .insert(id.to_string(), record.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> BridgeResult<()> {
        self.records.lock().unwrap().remove(id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySettings {
    pub fn value(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> BridgeResult<Option<String>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> BridgeResult<()> {
        self.values.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> BridgeResult<Vec<String>> {
        Ok(self.values.lock().unwrap().keys().cloned().collect())
    }
}

type PutHook = Box<dyn Fn(usize) + Send + Sync>;

/// Remote namespace kept in memory.
///
/// Asset puts (not the tombstone list) are counted, can be slowed down, can
/// fail for chosen ids and can trigger a hook after each completion.
#[derive(Default)]
pub struct MemoryRemote {
    objects: Mutex<BTreeMap<String, Bytes>>,
    index_loaded: AtomicBool,
    pub puts: AtomicUsize,
    pub deletes: AtomicUsize,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
    put_delay: Mutex<Option<Duration>>,
    failing: Mutex<BTreeSet<String>>,
    on_put: Mutex<Option<PutHook>>,
    preload_gate: Mutex<Option<Arc<Notify>>>,
    failing_preload: AtomicBool,
    failing_reads: AtomicBool,
}

impl MemoryRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, id: &str) {
        let body = serde_json::to_vec(&record(id).to_transport()).unwrap();
        self.objects
            .lock()
            .unwrap()
            .insert(id.to_string(), Bytes::from(body));
    }

    pub fn set_tombstones(&self, ids: &[&str]) {
        let set: TombstoneSet = ids.iter().copied().collect();
        self.objects.lock().unwrap().insert(
            REMOTE_TOMBSTONES_KEY.to_string(),
            Bytes::from(set.to_json().unwrap()),
        );
    }

    /// Asset ids, without the reserved tombstone object
    pub fn ids(&self) -> BTreeSet<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|key| key.as_str() != REMOTE_TOMBSTONES_KEY)
            .cloned()
            .collect()
    }

    pub fn tombstones(&self) -> TombstoneSet {
        match self.objects.lock().unwrap().get(REMOTE_TOMBSTONES_KEY) {
            Some(body) => serde_json::from_slice(body).unwrap(),
            None => TombstoneSet::new(),
        }
    }

    pub fn index_loaded(&self) -> bool {
        self.index_loaded.load(Ordering::SeqCst)
    }

    pub fn slow_puts(&self, delay: Duration) {
        *self.put_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_put(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    pub fn on_put(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        *self.on_put.lock().unwrap() = Some(Box::new(hook));
    }

    /// `preload_index` loads part of the index, then fails
    pub fn fail_preload(&self) {
        self.failing_preload.store(true, Ordering::SeqCst);
    }

    /// Every `get_raw` fails
    pub fn fail_reads(&self) {
        self.failing_reads.store(true, Ordering::SeqCst);
    }

    /// Make `preload_index` wait until the returned gate is notified
    pub fn gate_preload(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.preload_gate.lock().unwrap() = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl RemoteObjectStore for MemoryRemote {
    async fn ensure_namespace(&self) -> BridgeResult<String> {
        Ok("folder-inlays".to_string())
    }

    async fn list(&self) -> BridgeResult<HashMap<String, String>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .map(|key| (key.clone(), format!("file-{}", key)))
            .collect())
    }

    async fn get_raw(&self, key: &str) -> BridgeResult<Option<Bytes>> {
        if self.failing_reads.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed(format!(
                "download of {} failed: HTTP 503",
                key
            )));
        }
        Ok(self.objects.lock().unwrap().get(key).cloned())
    }

    async fn put_raw(&self, key: &str, body: Bytes) -> BridgeResult<()> {
        if key == REMOTE_TOMBSTONES_KEY {
            self.objects.lock().unwrap().insert(key.to_string(), body);
            return Ok(());
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.put_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.lock().unwrap().contains(key) {
            return Err(BridgeError::OperationFailed(format!(
                "upload of {} failed: HTTP 500",
                key
            )));
        }

        self.objects.lock().unwrap().insert(key.to_string(), body);
        let count = self.puts.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(hook) = self.on_put.lock().unwrap().as_ref() {
            hook(count);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> BridgeResult<()> {
        if self.objects.lock().unwrap().remove(key).is_some() {
            self.deletes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn preload_index(&self) -> BridgeResult<()> {
        let gate = self.preload_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.index_loaded.store(true, Ordering::SeqCst);
        if self.failing_preload.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed(
                "listing page 2 failed: HTTP 500".to_string(),
            ));
        }
        Ok(())
    }

    fn clear_index(&self) {
        self.index_loaded.store(false, Ordering::SeqCst);
    }

    fn clear_cache(&self) {
        self.index_loaded.store(false, Ordering::SeqCst);
    }
}

/// One device: its local store, settings, tombstones and engine
pub struct Replica {
    pub store: Arc<MemoryAssets>,
    pub settings: Arc<MemorySettings>,
    pub tombstones: Arc<TombstoneStore>,
    pub local: Arc<LocalAssets>,
    pub engine: Arc<SyncEngine>,
}

impl Replica {
    pub fn new(remote: Arc<MemoryRemote>) -> Self {
        Self::with_tokens(remote, Arc::new(StaticTokenProvider::new("token")))
    }

    pub fn with_tokens(remote: Arc<MemoryRemote>, tokens: Arc<dyn TokenProvider>) -> Self {
        let store = Arc::new(MemoryAssets::default());
        let settings = Arc::new(MemorySettings::default());
        let tombstones = Arc::new(TombstoneStore::new(
            settings.clone(),
            remote.clone(),
            Duration::from_millis(10),
        ));
        let local = Arc::new(LocalAssets::new(store.clone(), tombstones.clone()));
        let engine = Arc::new(SyncEngine::new(
            local.clone(),
            remote,
            tombstones.clone(),
            tokens,
        ));

        Self {
            store,
            settings,
            tombstones,
            local,
            engine,
        }
    }

    pub async fn create(&self, ids: &[&str]) {
        for id in ids {
            self.local.put(id, &record(id)).await.unwrap();
        }
    }

    pub fn ids(&self) -> BTreeSet<String> {
        self.store.ids()
    }
}

pub fn ids(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|id| id.to_string()).collect()
}
