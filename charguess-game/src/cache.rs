//! Content-addressed TTL cache in front of every outbound metadata call.
//!
//! Entries live in the shared [`KvStore`] so every session (and every
//! process sharing the store) benefits. There is no background sweep: a
//! stale entry is noticed, deleted and refetched on the next read.
//! Concurrent misses on the same key both fetch and the last write wins.
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::clock::Clock;
use crate::constants::{CACHE_TABLE, DEFAULT_CACHE_TTL_SECS};
use crate::error::GameError;
use crate::http::{HttpRequest, HttpResponse, HttpTransport, Method};
use crate::store::KvStore;

/// Persisted cache payload: the response minus transport-only fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub status: u16,
    pub body: Value,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    fn from_response(response: &HttpResponse, stored_at: DateTime<Utc>) -> Self {
        Self {
            status: response.status,
            body: response.body.clone(),
            stored_at,
        }
    }

    fn into_response(self) -> HttpResponse {
        HttpResponse {
            status: self.status,
            headers: Vec::new(),
            body: self.body,
        }
    }

    fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.stored_at < ttl
    }
}

/// Hit and fetch counters per method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub get_hits: u64,
    pub post_hits: u64,
    pub get_fetches: u64,
    pub post_fetches: u64,
}

#[derive(Debug, Default)]
struct Counters {
    get_hits: AtomicU64,
    post_hits: AtomicU64,
    get_fetches: AtomicU64,
    post_fetches: AtomicU64,
}

impl Counters {
    fn hit(&self, method: Method) {
        match method {
            Method::Get => self.get_hits.fetch_add(1, Ordering::Relaxed),
            Method::Post => self.post_hits.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn fetch(&self, method: Method) {
        match method {
            Method::Get => self.get_fetches.fetch_add(1, Ordering::Relaxed),
            Method::Post => self.post_fetches.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            get_hits: self.get_hits.load(Ordering::Relaxed),
            post_hits: self.post_hits.load(Ordering::Relaxed),
            get_fetches: self.get_fetches.load(Ordering::Relaxed),
            post_fetches: self.post_fetches.load(Ordering::Relaxed),
        }
    }
}

/// Stable key for a logical request: identical (method, url, params) always collide.
#[must_use]
pub fn cache_key(request: &HttpRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request.method.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(request.url.as_bytes());
    hasher.update(b"\n");
    hasher.update(request.identity_params().to_string().as_bytes());
    let digest: String = hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect();
    format!("{}:{digest}", request.method.as_str())
}

/// TTL request cache wrapping an [`HttpTransport`].
pub struct RequestCache<T> {
    transport: T,
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    counters: Counters,
}

impl<T: HttpTransport> RequestCache<T> {
    /// Create a cache with the default 24 hour TTL.
    pub fn new(transport: T, store: Arc<dyn KvStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            transport,
            store,
            clock,
            ttl: Duration::seconds(DEFAULT_CACHE_TTL_SECS),
            counters: Counters::default(),
        }
    }

    /// Override the entry lifetime.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached GET.
    ///
    /// # Errors
    ///
    /// Returns an error if the live call or the store fails.
    pub async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<HttpResponse, GameError> {
        let mut request = HttpRequest::get(url);
        for (key, value) in query {
            request = request.with_query(key, value);
        }
        self.execute(&request).await
    }

    /// Cached POST; the body participates in the key.
    ///
    /// # Errors
    ///
    /// Returns an error if the live call or the store fails.
    pub async fn post(
        &self,
        url: &str,
        query: &[(&str, String)],
        body: Value,
    ) -> Result<HttpResponse, GameError> {
        let mut request = HttpRequest::post(url, body);
        for (key, value) in query {
            request = request.with_query(key, value);
        }
        self.execute(&request).await
    }

    /// Serve a request from cache when fresh, otherwise perform it live.
    ///
    /// # Errors
    ///
    /// Returns an error if the live call or the store fails.
    pub async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, GameError> {
        let key = cache_key(request);
        if let Some(entry) = self.lookup(&key).await? {
            self.counters.hit(request.method);
            log::debug!("cache hit {} {}", request.method, request.url);
            return Ok(entry.into_response());
        }

        self.counters.fetch(request.method);
        log::debug!("cache miss {} {}", request.method, request.url);
        let response = self.transport.send(request).await?;
        if response.status == 200 {
            let entry = CacheEntry::from_response(&response, self.clock.now());
            let value = serde_json::to_value(&entry).map_err(|source| GameError::Record {
                key: key.clone(),
                source,
            })?;
            self.store.set(CACHE_TABLE, &key, value).await?;
        }
        Ok(HttpResponse {
            headers: Vec::new(),
            ..response
        })
    }

    async fn lookup(&self, key: &str) -> Result<Option<CacheEntry>, GameError> {
        let Some(raw) = self.store.get(CACHE_TABLE, key).await? else {
            return Ok(None);
        };
        let entry = match serde_json::from_value::<CacheEntry>(raw) {
            Ok(entry) => entry,
            Err(err) => {
                log::warn!("discarding unreadable cache entry {key}: {err}");
                self.store.delete(CACHE_TABLE, key).await?;
                return Ok(None);
            }
        };
        if entry.is_fresh(self.clock.now(), self.ttl) {
            Ok(Some(entry))
        } else {
            self.store.delete(CACHE_TABLE, key).await?;
            Ok(None)
        }
    }

    /// Drop the cached entry for one logical request.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn invalidate(&self, request: &HttpRequest) -> Result<bool, GameError> {
        Ok(self.store.delete(CACHE_TABLE, &cache_key(request)).await?)
    }

    /// Drop every cached entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn clear(&self) -> Result<(), GameError> {
        Ok(self.store.delete_all(CACHE_TABLE).await?)
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }
}
