//! Request cache shared by every plugin and marketplace query
//!
//! Responses are stored as JSON under a [`QueryKey`]. A key is a path of
//! string parts, and invalidation works on prefixes, so invalidating
//! `plugins` drops every plugin query at once. Fetches of the same key are
//! serialized: a caller that waited behind an in-flight fetch reuses its
//! result instead of issuing a second request. Entries older than the
//! configured gc time are dropped whenever a new value is stored.

use crate::api::ApiError;
use crate::config::CacheConfig;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Hierarchical cache key, e.g. `plugins/versions/langgenius/ollama`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new(namespace: &str) -> Self {
        Self(vec![namespace.to_string()])
    }

    /// Append a plain string part
    pub fn with(mut self, part: impl Into<String>) -> Self {
        self.0.push(part.into());
        self
    }

    /// Append a structured part (id lists, payload objects) in its JSON form
    pub fn with_json<T: Serialize + ?Sized>(mut self, part: &T) -> Self {
        let encoded = serde_json::to_string(part).unwrap_or_default();
        self.0.push(encoded);
        self
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

/// Per-query overrides of the cache defaults
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    pub stale_time: Option<Duration>,
    pub retry: Option<u32>,
}

impl QueryOptions {
    /// Never retry; uploads, downloads and marketplace batch lookups
    pub fn no_retry() -> Self {
        Self {
            retry: Some(0),
            ..Self::default()
        }
    }

    pub fn always_fresh() -> Self {
        Self {
            stale_time: Some(Duration::ZERO),
            ..Self::default()
        }
    }

    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }
}

struct CacheEntry {
    value: Value,
    fetched_at: Instant,
    invalidated: bool,
}

pub struct QueryCache {
    entries: DashMap<QueryKey, CacheEntry>,
    in_flight: DashMap<QueryKey, Arc<Mutex<()>>>,
    stale_time: Duration,
    retry: u32,
    retry_base_delay: Duration,
    gc_time: Duration,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

impl QueryCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            in_flight: DashMap::new(),
            stale_time: Duration::from_millis(config.stale_time_ms),
            retry: config.retry,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
            gc_time: Duration::from_millis(config.gc_time_ms),
        }
    }

    /// Return a fresh cached value for `key`, or run `fetcher` and cache its result.
    pub async fn fetch<T, F, Fut>(
        &self,
        key: &QueryKey,
        options: QueryOptions,
        fetcher: F,
    ) -> Result<T, ApiError>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let requested_at = Instant::now();
        let result = {
            let lock = self.in_flight.entry(key.clone()).or_default().clone();
            let _guard = lock.lock().await;
            self.fetch_locked(key, options, requested_at, &fetcher).await
        };
        // Only the map still holds the lock: nobody is queued on this key
        self.in_flight
            .remove_if(key, |_, slot| Arc::strong_count(slot) == 1);
        result
    }

    async fn fetch_locked<T, F, Fut>(
        &self,
        key: &QueryKey,
        options: QueryOptions,
        requested_at: Instant,
        fetcher: &F,
    ) -> Result<T, ApiError>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let stale_time = options.stale_time.unwrap_or(self.stale_time);
        if let Some(value) = self.reusable(key, stale_time, requested_at) {
            match serde_json::from_value(value) {
                Ok(cached) => {
                    tracing::debug!("cache hit: {}", key);
                    return Ok(cached);
                }
                Err(e) => tracing::debug!("cache entry {} has another shape: {}", key, e),
            }
        }

        let retry = options.retry.unwrap_or(self.retry);
        let result = self.fetch_with_retry(key, retry, fetcher).await?;
        let value = serde_json::to_value(&result)?;
        self.collect_garbage();
        self.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                fetched_at: Instant::now(),
                invalidated: false,
            },
        );
        Ok(result)
    }

    /// Read the last stored value without fetching, fresh or not
    pub fn get<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
        let entry = self.entries.get(key)?;
        serde_json::from_value(entry.value.clone()).ok()
    }

    /// Seed a key, as if it had just been fetched
    pub fn set<T: Serialize>(&self, key: &QueryKey, value: &T) {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.collect_garbage();
                self.entries.insert(
                    key.clone(),
                    CacheEntry {
                        value,
                        fetched_at: Instant::now(),
                        invalidated: false,
                    },
                );
            }
            Err(e) => tracing::warn!("refusing to cache {}: {}", key, e),
        }
    }

    /// Mark every entry under `prefix` stale. Returns how many were hit.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let mut count = 0;
        for mut entry in self.entries.iter_mut() {
            if entry.key().starts_with(prefix) {
                entry.invalidated = true;
                count += 1;
            }
        }
        tracing::debug!("invalidated {} entries under {}", count, prefix);
        count
    }

    /// Whether `key` holds a value that the next fetch must not reuse
    pub fn is_invalidated(&self, key: &QueryKey) -> bool {
        self.entries.get(key).is_some_and(|e| e.invalidated)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn collect_garbage(&self) {
        let gc_time = self.gc_time;
        self.entries
            .retain(|_, entry| entry.fetched_at.elapsed() < gc_time);
    }

    fn reusable(&self, key: &QueryKey, stale_time: Duration, requested_at: Instant) -> Option<Value> {
        let entry = self.entries.get(key)?;
        if entry.invalidated {
            return None;
        }
        // Fetched by whoever held the lock while we waited
        let fetched_while_waiting = entry.fetched_at >= requested_at;
        if fetched_while_waiting || entry.fetched_at.elapsed() < stale_time {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    async fn fetch_with_retry<T, F, Fut>(
        &self,
        key: &QueryKey,
        retry: u32,
        fetcher: &F,
    ) -> Result<T, ApiError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 0;
        loop {
            match fetcher().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < retry && e.is_retryable() => {
                    let delay = self.retry_delay(attempt);
                    attempt += 1;
                    tracing::debug!(
                        "{} failed ({}), retry {}/{} in {:?}",
                        key,
                        e,
                        attempt,
                        retry,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.retry_base_delay
            .saturating_mul(factor)
            .min(MAX_RETRY_DELAY)
    }
}
