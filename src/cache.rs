//! # Derived-Data Cache
//! Memoizes corpora, probability tables and feature rankings as JSON blobs
//! keyed by an opaque string. The cache is optional: with no store every
//! value is recomputed, and a failing store only costs time.
//!
//! Recomputation is single-flight per key: concurrent callers asking for the
//! same missing key wait on one computation and then read its stored result.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::geo::CityList;
use crate::ingest::types::GeoTaggedMessage;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("derived_cache_hits_total", "Derived values served from the cache.");
        describe_counter!("derived_cache_misses_total", "Derived values recomputed.");
        describe_counter!(
            "derived_cache_errors_total",
            "Cache store failures (value recomputed instead)."
        );
    });
}

/// Result of a cache read.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
    Hit(T),
    Miss,
}

impl<T> CacheLookup<T> {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            CacheLookup::Hit(v) => Some(v),
            CacheLookup::Miss => None,
        }
    }
}

/// Key-value blob storage behind the cache.
pub trait CacheStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, CacheError>;
    fn store(&self, key: &str, blob: &str) -> Result<(), CacheError>;
    fn remove(&self, key: &str) -> Result<(), CacheError>;
    fn name(&self) -> &'static str;
}

/// Process-local store; lost on restart.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }
}

impl CacheStore for MemoryBlobStore {
    fn load(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.blobs.lock().get(key).cloned())
    }

    fn store(&self, key: &str, blob: &str) -> Result<(), CacheError> {
        self.blobs.lock().insert(key.to_string(), blob.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.blobs.lock().remove(key);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// One JSON file per key under `dir`; file names are SHA-256 of the key.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    /// Creates `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sha256_hex(key.as_bytes())))
    }
}

impl CacheStore for FileBlobStore {
    fn load(&self, key: &str) -> Result<Option<String>, CacheError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, key: &str, blob: &str) -> Result<(), CacheError> {
        // Write-then-rename so readers never see a partial blob.
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, blob)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

/// Cache front used by the engine. Cheap to share behind an `Arc`.
pub struct DerivedCache {
    store: Option<Arc<dyn CacheStore>>,
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for DerivedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedCache")
            .field("store", &self.store_name())
            .finish()
    }
}

impl DerivedCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store: Some(store),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// No store: every value is recomputed.
    pub fn disabled() -> Self {
        Self {
            store: None,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBlobStore::new()))
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn store_name(&self) -> &'static str {
        self.store.as_ref().map_or("none", |s| s.name())
    }

    /// Read and decode `key`. Store and decode failures count as a miss.
    pub fn lookup<T: DeserializeOwned>(&self, key: &str) -> CacheLookup<T> {
        let Some(store) = &self.store else {
            return CacheLookup::Miss;
        };
        let blob = match store.load(key) {
            Ok(Some(b)) => b,
            Ok(None) => return CacheLookup::Miss,
            Err(e) => {
                self.report(key, "load", &e);
                return CacheLookup::Miss;
            }
        };
        match serde_json::from_str(&blob) {
            Ok(v) => CacheLookup::Hit(v),
            Err(e) => {
                self.report(key, "decode", &CacheError::from(e));
                CacheLookup::Miss
            }
        }
    }

    /// Encode and write `value`. Failures are logged and counted only.
    pub fn put<T: Serialize>(&self, key: &str, value: &T) {
        let Some(store) = &self.store else {
            return;
        };
        let res = serde_json::to_string(value)
            .map_err(CacheError::from)
            .and_then(|blob| store.store(key, &blob));
        if let Err(e) = res {
            self.report(key, "store", &e);
        }
    }

    pub fn invalidate(&self, key: &str) {
        if let Some(store) = &self.store {
            if let Err(e) = store.remove(key) {
                self.report(key, "remove", &e);
            }
        }
    }

    /// Cached value for `key`, or `compute()` stored under `key`.
    /// At most one caller computes a given key at a time.
    pub fn get_or_compute<T, F>(&self, key: &str, compute: F) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        ensure_metrics_described();

        if self.store.is_none() {
            counter!("derived_cache_misses_total").increment(1);
            return compute();
        }
        if let CacheLookup::Hit(v) = self.lookup(key) {
            counter!("derived_cache_hits_total").increment(1);
            return v;
        }

        let gate = self.gate(key);
        let value = {
            let _held = gate.lock();
            // Another caller may have filled the key while we waited.
            match self.lookup(key) {
                CacheLookup::Hit(v) => {
                    counter!("derived_cache_hits_total").increment(1);
                    v
                }
                CacheLookup::Miss => {
                    counter!("derived_cache_misses_total").increment(1);
                    debug!(target: "cache", key, "recomputing");
                    let v = compute();
                    self.put(key, &v);
                    v
                }
            }
        };
        self.release(key, &gate);
        value
    }

    fn gate(&self, key: &str) -> Arc<Mutex<()>> {
        self.inflight
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn release(&self, key: &str, gate: &Arc<Mutex<()>>) {
        let mut map = self.inflight.lock();
        if map.get(key).is_some_and(|g| Arc::ptr_eq(g, gate)) {
            map.remove(key);
        }
    }

    fn report(&self, key: &str, op: &'static str, err: &CacheError) {
        counter!("derived_cache_errors_total").increment(1);
        warn!(
            target: "cache",
            store = self.store_name(),
            key,
            op,
            error = %err,
            "cache store failed"
        );
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Short SHA-256 prefix of a text, safe to log instead of the text itself.
pub(crate) fn anon_hash(text: &str) -> String {
    sha256_hex(text.as_bytes())[..12].to_string()
}

/// Content hash of everything a snapshot derives from: the message set,
/// the city list (order included) and the distance threshold.
pub fn snapshot_key(
    messages: &[GeoTaggedMessage],
    cities: &CityList,
    max_distance_km: f64,
) -> String {
    let mut h = Sha256::new();
    h.update(b"messages\0");
    for m in messages {
        h.update(m.id.as_bytes());
        h.update([0]);
        h.update(m.text.as_bytes());
        h.update([0]);
        h.update(m.longitude.to_bits().to_le_bytes());
        h.update(m.latitude.to_bits().to_le_bytes());
    }
    h.update(b"cities\0");
    for c in cities.iter() {
        h.update(c.name.as_bytes());
        h.update([0]);
        h.update(c.longitude.to_bits().to_le_bytes());
        h.update(c.latitude.to_bits().to_le_bytes());
    }
    h.update(b"threshold\0");
    h.update(max_distance_km.to_bits().to_le_bytes());

    let digest = h.finalize();
    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// `<kind>/<snapshot>[/<part>]`
pub fn derived_key(kind: &str, snapshot: &str, part: Option<&str>) -> String {
    match part {
        Some(p) => format!("{kind}/{snapshot}/{p}"),
        None => format!("{kind}/{snapshot}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn disabled_cache_always_recomputes() {
        let cache = DerivedCache::disabled();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let v: u32 = cache.get_or_compute("k", || {
                calls.fetch_add(1, Ordering::SeqCst);
                7
            });
            assert_eq!(v, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.lookup::<u32>("k"), CacheLookup::Miss);
    }

    #[test]
    fn memory_cache_computes_once() {
        let cache = DerivedCache::in_memory();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let v: Vec<String> = cache.get_or_compute("words", || {
                calls.fetch_add(1, Ordering::SeqCst);
                vec!["beach".to_string()]
            });
            assert_eq!(v, vec!["beach"]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate("words");
        assert!(!cache.lookup::<Vec<String>>("words").is_hit());
    }

    #[test]
    fn undecodable_blob_is_a_miss() {
        let store = Arc::new(MemoryBlobStore::new());
        store.store("k", "not json").unwrap();
        let cache = DerivedCache::new(store);
        assert_eq!(cache.lookup::<u32>("k"), CacheLookup::Miss);
        let v: u32 = cache.get_or_compute("k", || 3);
        assert_eq!(v, 3);
        assert_eq!(cache.lookup::<u32>("k"), CacheLookup::Hit(3));
    }

    #[test]
    fn snapshot_key_tracks_content() {
        let cities = CityList::us_default();
        let a = vec![GeoTaggedMessage::new("1", "hi", -74.0, 40.7)];
        let b = vec![GeoTaggedMessage::new("1", "hi!", -74.0, 40.7)];
        let ka = snapshot_key(&a, &cities, 240.0);
        assert_eq!(ka, snapshot_key(&a, &cities, 240.0));
        assert_ne!(ka, snapshot_key(&b, &cities, 240.0));
        assert_ne!(ka, snapshot_key(&a, &cities, 100.0));
        assert_eq!(ka.len(), 32);
        assert_eq!(anon_hash("hello").len(), 12);
    }
}
