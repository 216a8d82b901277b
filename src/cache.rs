//! A bounded, time-limited cache of rendered markup.
//!
//! Highlighting is a pure function of its inputs, so a result can be
//! reused until the engine is disposed.
use crate::engine::RenderOptions;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct CacheKey {
    code: String,
    lang: String,
    theme: String,
    options: String,
}

impl CacheKey {
    pub fn new(
        code: &str,
        lang: &str,
        theme: &str,
        options: &RenderOptions,
    ) -> Self {
        CacheKey {
            code: code.into(),
            lang: lang.into(),
            theme: theme.into(),
            options: if options.is_empty() {
                String::new()
            } else {
                serde_json::Value::from(options.clone()).to_string()
            },
        }
    }
}

struct Entry {
    markup: String,
    expires: Instant,
    last_used: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<CacheKey, Entry>,
    /// Keys by `last_used`, least recent first.
    recency: BTreeMap<u64, CacheKey>,
    clock: u64,
    /// Bumped by every clear, so renders started before it are not
    /// stored after it.
    epoch: u64,
    stats: CacheStats,
}

impl Inner {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn remove(&mut self, key: &CacheKey) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.recency.remove(&entry.last_used);
                true
            }
            None => false,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Batch items served by an identical item in the same batch.
    pub deduplicated: u64,
}

pub struct RenderCache {
    capacity: usize,
    ttl: Duration,
    inner: Mutex<Inner>,
}

impl RenderCache {
    /// A capacity of zero disables caching.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        RenderCache {
            capacity,
            ttl,
            inner: Mutex::default(),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &CacheKey) -> Option<String> {
        if self.capacity == 0 {
            return None;
        }
        let mut guard = self.inner();
        let inner = &mut *guard;
        let now = inner.tick();
        let found = match inner.entries.get_mut(key) {
            Some(entry) if entry.expires > Instant::now() => {
                inner.recency.remove(&entry.last_used);
                inner.recency.insert(now, key.clone());
                entry.last_used = now;
                Some(entry.markup.clone())
            }
            _ => None,
        };
        if found.is_some() {
            inner.stats.hits += 1;
        } else {
            // Drop it if it was there but expired.
            inner.remove(key);
            inner.stats.misses += 1;
        }
        found
    }

    /// The current epoch, to pass to [`RenderCache::put`].
    pub fn epoch(&self) -> u64 {
        self.inner().epoch
    }

    /// Store a rendered result, unless the cache was cleared since
    /// `epoch` was read.
    pub fn put(&self, key: CacheKey, markup: String, epoch: u64) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner();
        if inner.epoch != epoch {
            debug!("Cache cleared during render, result not stored.");
            return;
        }
        inner.remove(&key);
        let now = inner.tick();
        inner.recency.insert(now, key.clone());
        let entry = Entry {
            markup,
            expires: Instant::now() + self.ttl,
            last_used: now,
        };
        inner.entries.insert(key, entry);
        while inner.entries.len() > self.capacity {
            let Some((_, oldest)) = inner.recency.pop_first() else {
                break;
            };
            inner.entries.remove(&oldest);
            inner.stats.evictions += 1;
        }
    }

    pub fn record_deduplicated(&self, n: usize) {
        if n > 0 {
            self.inner().stats.deduplicated += n as u64;
        }
    }

    /// Drop expired entries, returning how many were dropped.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let mut guard = self.inner();
        let inner = &mut *guard;
        let before = inner.entries.len();
        let recency = &mut inner.recency;
        inner.entries.retain(|_, e| {
            let keep = e.expires > now;
            if !keep {
                recency.remove(&e.last_used);
            }
            keep
        });
        let removed = before - inner.entries.len();
        if removed > 0 {
            debug!("Removed {removed} expired cache entries.");
        }
        removed
    }

    pub fn clear(&self) {
        let mut inner = self.inner();
        let size = inner.entries.len();
        inner.entries.clear();
        inner.recency.clear();
        inner.epoch += 1;
        debug!("Cleared render cache, {size} entries dropped.");
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner();
        CacheStats {
            entries: inner.entries.len(),
            ..inner.stats.clone()
        }
    }
}
