//! Bounded LRU memoization of composed results.
//!
//! Entries are keyed by a [`Fingerprint`]: a 128-bit SipHash-1-3 of the
//! source image (dimensions and raw bytes) paired with a 128-bit hash of
//! the configuration's JSON form. Two different inputs with the same
//! fingerprint are treated as the same input. SipHash is not a
//! cryptographic hash, but at 128 bits per side an accidental collision
//! is far less likely than any other failure; a deliberately crafted
//! collision would return a stale render, never corrupt state.

use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::Arc;

use serde::Serialize;
use siphasher::sip128::{Hasher128, SipHasher13};

use crate::types::RgbaImage;

/// Cache key over an image and a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    image: u128,
    config: u128,
}

impl Fingerprint {
    /// Fingerprint an image together with any serializable configuration.
    ///
    /// Returns `None` if the configuration cannot be serialized.
    #[must_use]
    pub fn new(image: &RgbaImage, config: &impl Serialize) -> Option<Self> {
        let bytes = serde_json::to_vec(config).ok()?;
        let mut hasher = SipHasher13::new();
        hasher.write(&bytes);
        Some(Self {
            image: Self::image_hash(image),
            config: hasher.finish128().as_u128(),
        })
    }

    /// Content hash of an image buffer.
    #[must_use]
    pub fn image_hash(image: &RgbaImage) -> u128 {
        let mut hasher = SipHasher13::new();
        hasher.write_u32(image.width());
        hasher.write_u32(image.height());
        hasher.write(image.as_raw());
        hasher.finish128().as_u128()
    }
}

/// Hit/miss counters and occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
    pub capacity: usize,
}

impl CacheStats {
    /// Fraction of lookups that hit, or 0 with no lookups.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct Entry<T> {
    value: Arc<T>,
    last_access: u64,
}

/// Fixed-capacity map from [`Fingerprint`] to a shared value, evicting
/// the least recently accessed entry when full.
///
/// A capacity of zero disables storage: every `get` misses.
#[derive(Debug)]
pub struct ResultCache<T> {
    entries: HashMap<Fingerprint, Entry<T>>,
    capacity: usize,
    tick: u64,
    hits: u64,
    misses: u64,
}

impl<T> ResultCache<T> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            capacity,
            tick: 0,
            hits: 0,
            misses: 0,
        }
    }

    const fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Look up a value, refreshing its recency on a hit.
    pub fn get(&mut self, key: &Fingerprint) -> Option<Arc<T>> {
        let tick = self.next_tick();
        if let Some(entry) = self.entries.get_mut(key) {
            entry.last_access = tick;
            self.hits += 1;
            Some(Arc::clone(&entry.value))
        } else {
            self.misses += 1;
            None
        }
    }

    /// Insert or replace a value, evicting the least recently accessed
    /// entry if the cache is full.
    pub fn put(&mut self, key: Fingerprint, value: Arc<T>) {
        if self.capacity == 0 {
            return;
        }
        let tick = self.next_tick();
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(&k, _)| k);
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(
            key,
            Entry {
                value,
                last_access: tick,
            },
        );
    }

    /// Remove every entry. Counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            len: self.entries.len(),
            capacity: self.capacity,
        }
    }
}
