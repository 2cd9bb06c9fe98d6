//! Bounded TTL cache for research results.
//!
//! Advisory only: a miss or an expired entry falls through to a live query.
//! Eviction is an explicit operation here rather than cleanup bolted onto
//! inserts, so both the size bound and the TTL are independently testable.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

pub const DEFAULT_TTL: Duration = Duration::from_secs(6 * 60 * 60);
pub const DEFAULT_CAPACITY: usize = 100;

struct CacheEntry<T> {
    value: T,
    stored_at: Instant,
}

pub struct InsightCache<T> {
    capacity: usize,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry<T>>>,
}

impl<T: Clone> Default for InsightCache<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

impl<T: Clone> InsightCache<T> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub async fn put(&self, key: impl Into<String>, value: T) {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, entry| now.duration_since(entry.stored_at) < self.ttl);
        if entries.len() >= self.capacity {
            // Still full after dropping expired entries: evict the oldest.
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            key.into(),
            CacheEntry {
                value,
                stored_at: now,
            },
        );
    }

    pub async fn evict_expired(&self) {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, entry| now.duration_since(entry.stored_at) < self.ttl);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Cache key over the attributes that make two research queries equivalent.
/// Mileage is bucketed to the thousand so near-identical odometers share an
/// entry.
pub fn research_cache_key(
    kind: &str,
    make: &str,
    model: &str,
    year: i32,
    mileage: u32,
    state: Option<&str>,
) -> String {
    format!(
        "{kind}:{}:{}:{year}:{}k:{}",
        make.to_lowercase(),
        model.to_lowercase(),
        mileage / 1000,
        state.unwrap_or("any").to_lowercase(),
    )
}
