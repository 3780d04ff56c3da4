//! Content-addressed result cache.
//!
//! Entries are keyed by `(operation, request scope, fingerprint)` and stored
//! as JSON in a [`CacheStore`] with a per-operation TTL. The backing store is
//! Redis in production and an in-process map otherwise.
//!
//! Cache failures never fail a request: a read error is a miss and a write
//! error only costs a redundant provider call later.
//!
//! Each request scope may hold at most `CachePolicy::max_entries` live
//! entries. Occupancy is tracked per process; once a scope is full, new
//! results are not cached until older entries expire.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use agora_core::defaults::{CACHE_KEY_PREFIX, CACHE_MAX_ENTRIES};
use agora_core::{
    CacheStore, Content, Error, NormalizedResult, OperationKind, ProviderKind, Result, Scope,
};
use agora_inference::ExecuteOptions;

use crate::settings::mask_url;

// =============================================================================
// FINGERPRINT
// =============================================================================

/// SHA-256 hex digest of the request's cache-relevant parts.
///
/// Hashes canonical JSON of the operation, whitespace-normalized content,
/// model and the options that affect `op`. `serde_json` maps are sorted by
/// key, so option field order never changes the digest.
pub fn fingerprint(
    op: OperationKind,
    content: &Content,
    model: &str,
    options: &ExecuteOptions,
) -> String {
    let canonical = json!({
        "operation": op.as_str(),
        "content": content.normalized(),
        "model": model,
        "options": options.fingerprint_fields(op),
    });
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

// =============================================================================
// RESULT CACHE
// =============================================================================

/// Stored value: the normalized result plus who produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResult {
    pub result: NormalizedResult,
    pub provider: ProviderKind,
    pub model: String,
}

/// Live keys and their expiry, per request scope.
type Occupancy = HashMap<String, HashMap<String, Instant>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Typed cache over a [`CacheStore`].
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn CacheStore>,
    prefix: String,
    occupancy: Arc<Mutex<Occupancy>>,
}

impl ResultCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::with_prefix(store, CACHE_KEY_PREFIX)
    }

    pub fn with_prefix(store: Arc<dyn CacheStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            occupancy: Arc::default(),
        }
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    pub fn key(&self, op: OperationKind, scope: &Scope, fingerprint: &str) -> String {
        format!("{}:{}:{}:{}", self.prefix, op, scope.key(), fingerprint)
    }

    pub async fn get(
        &self,
        op: OperationKind,
        scope: &Scope,
        fingerprint: &str,
    ) -> Option<CachedResult> {
        let key = self.key(op, scope, fingerprint);
        match self.store.get(&key).await {
            Ok(Some(data)) => match serde_json::from_str::<CachedResult>(&data) {
                Ok(entry) if entry.result.matches_operation(op) => {
                    debug!(key = %key, backend = self.backend(), "Cache HIT");
                    Some(entry)
                }
                Ok(_) => {
                    warn!(key = %key, "Cached result does not match operation, ignoring");
                    None
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Cache deserialization error");
                    None
                }
            },
            Ok(None) => {
                debug!(key = %key, backend = self.backend(), "Cache MISS");
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Store an entry. A zero TTL stores nothing, and neither does a scope
    /// already holding `max_entries` live entries. Returns whether it was
    /// written.
    pub async fn put(
        &self,
        op: OperationKind,
        scope: &Scope,
        fingerprint: &str,
        entry: &CachedResult,
        ttl_secs: u64,
        max_entries: usize,
    ) -> bool {
        if ttl_secs == 0 {
            return false;
        }
        let key = self.key(op, scope, fingerprint);
        let data = match serde_json::to_string(entry) {
            Ok(data) => data,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache serialization error");
                return false;
            }
        };
        if !self.reserve(scope, &key, ttl_secs, max_entries) {
            debug!(key = %key, max_entries, "Cache full for scope, not storing");
            return false;
        }
        match self.store.set_ex(&key, &data, ttl_secs).await {
            Ok(()) => {
                debug!(key = %key, ttl_secs, "Cache SET");
                true
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache write failed");
                self.release(scope, &key);
                false
            }
        }
    }

    /// Live entries counted against `scope`.
    pub fn entries_for(&self, scope: &Scope) -> usize {
        let now = Instant::now();
        lock(&self.occupancy)
            .get(&scope.key())
            .map(|live| live.values().filter(|expires| **expires > now).count())
            .unwrap_or(0)
    }

    /// Claim a slot for `key` in `scope`. Rewriting a live key is always allowed.
    fn reserve(&self, scope: &Scope, key: &str, ttl_secs: u64, max_entries: usize) -> bool {
        let now = Instant::now();
        let mut occupancy = lock(&self.occupancy);
        let partition = scope.key();
        let live = occupancy.entry(partition.clone()).or_default();
        live.retain(|_, expires| *expires > now);
        if !live.contains_key(key) && live.len() >= max_entries {
            if live.is_empty() {
                occupancy.remove(&partition);
            }
            return false;
        }
        live.insert(key.to_string(), now + Duration::from_secs(ttl_secs));
        true
    }

    fn release(&self, scope: &Scope, key: &str) {
        let mut occupancy = lock(&self.occupancy);
        let partition = scope.key();
        if let Some(live) = occupancy.get_mut(&partition) {
            live.remove(key);
            if live.is_empty() {
                occupancy.remove(&partition);
            }
        }
    }

    pub async fn invalidate(&self, op: OperationKind, scope: &Scope, fingerprint: &str) -> bool {
        let key = self.key(op, scope, fingerprint);
        self.release(scope, &key);
        match self.store.delete(&key).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache delete failed");
                false
            }
        }
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("backend", &self.backend())
            .field("prefix", &self.prefix)
            .finish()
    }
}

// =============================================================================
// REDIS STORE
// =============================================================================

/// Redis-backed store using a multiplexed connection manager.
#[derive(Clone)]
pub struct RedisCacheStore {
    connection: ConnectionManager,
}

impl RedisCacheStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client =
            redis::Client::open(redis_url).map_err(|e| Error::Cache(format!("invalid URL: {}", e)))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::Cache(format!("connect failed: {}", e)))?;
        info!(
            subsystem = "cache",
            url = %mask_url(redis_url),
            "Redis result cache connected"
        );
        Ok(Self { connection })
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| Error::Cache(format!("GET: {}", e)))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .map_err(|e| Error::Cache(format!("SET: {}", e)))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| Error::Cache(format!("DEL: {}", e)))
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// Process-local store with TTL expiry and an entry cap.
///
/// When full, expired entries are purged first, then the entry closest to
/// expiry is dropped.
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, MemoryEntry>>,
    max_entries: usize,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::with_max_entries(CACHE_MAX_ENTRIES)
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn make_room(&self, entries: &mut HashMap<String, MemoryEntry>) {
        let now = Instant::now();
        entries.retain(|_, e| e.expires_at > now);
        while entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.expires_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut entries = self.entries.write().await;
        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            self.make_room(&mut entries);
        }
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: Instant::now() + Duration::from_secs(ttl_secs),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::{OperationOptions, OperationSettings};

    fn options_for(op: OperationKind, overrides: OperationOptions) -> ExecuteOptions {
        ExecuteOptions::resolve(&OperationSettings::defaults_for(op), &overrides)
    }

    #[test]
    fn test_fingerprint_is_stable_and_whitespace_insensitive() {
        let options = options_for(OperationKind::Summarize, OperationOptions::default());
        let a = fingerprint(
            OperationKind::Summarize,
            &Content::text("  Campus   food\ttruck  "),
            "gpt-4o-mini",
            &options,
        );
        let b = fingerprint(
            OperationKind::Summarize,
            &Content::text("Campus food truck"),
            "gpt-4o-mini",
            &options,
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fingerprint_varies_with_relevant_options() {
        let op = OperationKind::Summarize;
        let content = Content::text("lecture notes");
        let short = options_for(
            op,
            OperationOptions {
                max_length: Some(50),
                ..Default::default()
            },
        );
        let long = options_for(
            op,
            OperationOptions {
                max_length: Some(500),
                ..Default::default()
            },
        );
        assert_ne!(
            fingerprint(op, &content, "m", &short),
            fingerprint(op, &content, "m", &long)
        );
    }

    #[test]
    fn test_fingerprint_ignores_irrelevant_options() {
        let op = OperationKind::Embed;
        let content = Content::text("vector");
        let a = options_for(
            op,
            OperationOptions {
                temperature: Some(0.1),
                ..Default::default()
            },
        );
        let b = options_for(
            op,
            OperationOptions {
                temperature: Some(1.5),
                ..Default::default()
            },
        );
        assert_eq!(
            fingerprint(op, &content, "m", &a),
            fingerprint(op, &content, "m", &b)
        );
    }

    #[test]
    fn test_fingerprint_structured_key_order() {
        let options = options_for(OperationKind::Tag, OperationOptions::default());
        let a: serde_json::Value = serde_json::from_str(r#"{"b":1,"a":2}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"a":2,"b":1}"#).unwrap();
        assert_eq!(
            fingerprint(OperationKind::Tag, &Content::Structured(a), "m", &options),
            fingerprint(OperationKind::Tag, &Content::Structured(b), "m", &options)
        );
    }

    #[tokio::test]
    async fn test_result_cache_round_trip_and_zero_ttl() {
        let cache = ResultCache::new(Arc::new(MemoryCacheStore::new()));
        let scope = Scope::college("c1");
        let entry = CachedResult {
            result: NormalizedResult::Tags {
                tags: vec!["chess".into()],
                confidence: 0.9,
            },
            provider: ProviderKind::OpenAi,
            model: "gpt-4o-mini".into(),
        };

        assert!(!cache.put(OperationKind::Tag, &scope, "fp", &entry, 0, 10).await);
        assert!(cache.get(OperationKind::Tag, &scope, "fp").await.is_none());

        assert!(cache.put(OperationKind::Tag, &scope, "fp", &entry, 60, 10).await);
        assert_eq!(cache.get(OperationKind::Tag, &scope, "fp").await, Some(entry));
        assert!(cache
            .get(OperationKind::Tag, &Scope::college("c2"), "fp")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_result_cache_caps_entries_per_scope() {
        let cache = ResultCache::new(Arc::new(MemoryCacheStore::new()));
        let full = Scope::college("c1");
        let other = Scope::college("c2");
        let entry = CachedResult {
            result: NormalizedResult::Tags {
                tags: vec!["go".into()],
                confidence: 0.8,
            },
            provider: ProviderKind::Ollama,
            model: "llama3.2".into(),
        };

        assert!(cache.put(OperationKind::Tag, &full, "a", &entry, 60, 2).await);
        assert!(cache.put(OperationKind::Tag, &full, "b", &entry, 60, 2).await);
        assert!(!cache.put(OperationKind::Tag, &full, "c", &entry, 60, 2).await);
        assert!(cache.get(OperationKind::Tag, &full, "c").await.is_none());
        assert_eq!(cache.entries_for(&full), 2);

        // Refreshing a live key does not need a new slot.
        assert!(cache.put(OperationKind::Tag, &full, "a", &entry, 60, 2).await);
        // Other scopes have their own allowance.
        assert!(cache.put(OperationKind::Tag, &other, "c", &entry, 60, 2).await);

        assert!(cache.invalidate(OperationKind::Tag, &full, "b").await);
        assert!(cache.put(OperationKind::Tag, &full, "c", &entry, 60, 2).await);
        assert_eq!(cache.entries_for(&full), 2);

        assert!(!cache.put(OperationKind::Tag, &Scope::user("u1"), "a", &entry, 60, 0).await);
        assert_eq!(cache.entries_for(&Scope::user("u1")), 0);
    }

    #[tokio::test]
    async fn test_result_cache_rejects_mismatched_kind() {
        let store = Arc::new(MemoryCacheStore::new());
        let cache = ResultCache::new(store.clone());
        let scope = Scope::global();
        let entry = CachedResult {
            result: NormalizedResult::Tags {
                tags: vec![],
                confidence: 0.5,
            },
            provider: ProviderKind::OpenAi,
            model: "m".into(),
        };
        let data = serde_json::to_string(&entry).unwrap();
        store
            .set_ex(&cache.key(OperationKind::Summarize, &scope, "fp"), &data, 60)
            .await
            .unwrap();
        assert!(cache
            .get(OperationKind::Summarize, &scope, "fp")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_memory_store_expiry_and_cap() {
        let store = MemoryCacheStore::with_max_entries(2);
        store.set_ex("a", "1", 10).await.unwrap();
        store.set_ex("b", "2", 20).await.unwrap();
        store.set_ex("c", "3", 30).await.unwrap();
        assert_eq!(store.len().await, 2);
        assert!(store.get("a").await.unwrap().is_none());
        assert_eq!(store.get("c").await.unwrap().as_deref(), Some("3"));

        store.set_ex("d", "4", 0).await.unwrap();
        assert!(store.get("d").await.unwrap().is_none());

        store.delete("c").await.unwrap();
        assert!(store.get("c").await.unwrap().is_none());
    }

    #[test]
    fn test_key_layout() {
        let cache = ResultCache::new(Arc::new(MemoryCacheStore::new()));
        assert_eq!(
            cache.key(OperationKind::Tag, &Scope::college("c1"), "abc"),
            "agora:ai:tag:college:c1:abc"
        );
    }
}
