//! Per-address request throttling.
//!
//! Each remote identity gets a fixed-window bucket; the store is bounded so
//! a scan of the IPv4 space cannot grow it without limit. When the store is
//! full, expired buckets are collected first and an arbitrary bucket is
//! dropped if none have expired.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

pub const DEFAULT_QUOTA_PER_HOUR: u32 = 4;
pub const DEFAULT_MAX_ENTRIES: usize = 200_000;

struct Bucket {
    window_start: Instant,
    count: u32,
}

pub struct Throttle {
    quota: u32,
    window: Duration,
    max_entries: usize,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl Throttle {
    pub fn new(quota: u32, window: Duration, max_entries: usize) -> Self {
        Throttle {
            quota,
            window,
            max_entries,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// An hourly quota with the default store bound.
    pub fn per_hour(quota: u32) -> Self {
        Self::new(quota, Duration::from_secs(3600), DEFAULT_MAX_ENTRIES)
    }

    /// Record a hit for `key`. Returns false once the key is over quota for
    /// the current window.
    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    fn allow_at(&self, key: &str, now: Instant) -> bool {
        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(bucket) = buckets.get_mut(key) {
            if now.duration_since(bucket.window_start) >= self.window {
                bucket.window_start = now;
                bucket.count = 0;
            }
            bucket.count += 1;
            return bucket.count <= self.quota;
        }

        if buckets.len() >= self.max_entries {
            let window = self.window;
            buckets.retain(|_, b| now.duration_since(b.window_start) < window);
            if buckets.len() >= self.max_entries {
                if let Some(victim) = buckets.keys().next().cloned() {
                    debug!("throttle store full, evicting a bucket");
                    buckets.remove(&victim);
                }
            }
        }

        buckets.insert(
            key.to_string(),
            Bucket {
                window_start: now,
                count: 1,
            },
        );
        true
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
