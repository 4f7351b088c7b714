//! Verdict Cache
//!
//! Short-lived table from a request's correlation key to the filter decision
//! made for it, so the paired response meets the same fate.
//!
//! # Design
//!
//! - Keyed by the fixed-width 20-byte correlation key
//! - Sharded map: `remember`, `recall` and `sweep` are each atomic per key
//! - First write wins; a single `recall` consumes the entry
//! - Entries older than the TTL are evicted by `sweep`, which also runs
//!   opportunistically from `remember` once per sweep interval

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use relay_common::CorrelationKey;
use std::time::{Duration, Instant};

use crate::config::VerdictCacheConfig;

/// Filter decision for one correlation key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Verdict {
    /// Forward to the router
    #[default]
    Allow = 0,
    /// Drop silently
    Drop = 1,
}

impl Verdict {
    /// `Allow` when `allowed` is true
    #[inline(always)]
    pub fn from_allowed(allowed: bool) -> Self {
        if allowed {
            Self::Allow
        } else {
            Self::Drop
        }
    }

    /// Whether the record is forwarded
    #[inline(always)]
    pub fn is_allow(self) -> bool {
        self == Self::Allow
    }
}

#[derive(Debug, Clone, Copy)]
struct VerdictEntry {
    verdict: Verdict,
    remembered_at: Instant,
}

impl VerdictEntry {
    #[inline(always)]
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.remembered_at) >= ttl
    }
}

/// Single-use verdict table with TTL eviction
pub struct VerdictCache {
    entries: DashMap<CorrelationKey, VerdictEntry>,
    ttl: Duration,
    sweep_interval: Duration,
    last_sweep: Mutex<Instant>,
}

impl VerdictCache {
    /// Create cache with the given TTL and opportunistic sweep interval
    pub fn new(ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            sweep_interval,
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Create cache from config
    pub fn from_config(config: &VerdictCacheConfig) -> Self {
        Self::new(config.ttl(), config.sweep_interval())
    }

    /// Record the verdict for a request.
    ///
    /// Returns `false` when a live entry for `key` already exists; the
    /// existing verdict is kept.
    pub fn remember(&self, key: CorrelationKey, verdict: Verdict) -> bool {
        let now = Instant::now();
        self.maybe_sweep(now);

        let entry = VerdictEntry {
            verdict,
            remembered_at: now,
        };
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now, self.ttl) {
                    occupied.insert(entry);
                    true
                } else {
                    tracing::debug!(key = %key, "verdict already recorded, keeping first");
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                true
            }
        }
    }

    /// Take the verdict for `key`. A second call for the same key returns
    /// `None`, as does a call after the entry expired.
    pub fn recall(&self, key: &CorrelationKey) -> Option<Verdict> {
        let (_, entry) = self.entries.remove(key)?;
        if entry.is_expired(Instant::now(), self.ttl) {
            return None;
        }
        Some(entry.verdict)
    }

    /// Evict entries older than the TTL as of `now`; returns how many
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, entry| !entry.is_expired(now, ttl));
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.entries.len(), "swept orphaned verdicts");
        }
        evicted
    }

    /// Sweep if the interval has elapsed and nobody else is sweeping
    fn maybe_sweep(&self, now: Instant) {
        let Some(mut last) = self.last_sweep.try_lock() else {
            return;
        };
        if now.saturating_duration_since(*last) < self.sweep_interval {
            return;
        }
        *last = now;
        drop(last);
        self.sweep(now);
    }

    /// Number of live (unswept) entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for VerdictCache {
    fn default() -> Self {
        Self::from_config(&VerdictCacheConfig::default())
    }
}
