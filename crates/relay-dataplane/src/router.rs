//! Router
//!
//! Picks the outputs that receive a record. Three mutually exclusive
//! policies:
//!
//! | Policy | Outputs per record | Affinity |
//! |--------|--------------------|----------|
//! | Broadcast | all | n/a |
//! | RoundRobin | one, by shared counter | none |
//! | SessionAffinity | one, by correlation-key hash | per key |
//!
//! The selection is a sub-slice of the caller's output list, so broadcasting
//! costs nothing and no output handle is cloned.

use relay_common::CorrelationKey;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Output selection policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingPolicy {
    /// Every output receives every record
    #[default]
    Broadcast,
    /// One output per record, rotating
    RoundRobin,
    /// One output per correlation key
    SessionAffinity,
}

/// Per-emitter routing state
#[derive(Debug, Default)]
pub struct Router {
    policy: RoutingPolicy,
    /// Round-robin position (monotonic, wraps)
    counter: AtomicUsize,
}

impl Router {
    /// Create router with policy
    pub fn new(policy: RoutingPolicy) -> Self {
        Self {
            policy,
            counter: AtomicUsize::new(0),
        }
    }

    /// Active policy
    #[inline]
    pub fn policy(&self) -> RoutingPolicy {
        self.policy
    }

    /// Select the outputs for a record with correlation key `key`.
    ///
    /// Returns an empty slice when `outputs` is empty.
    #[inline]
    pub fn select<'a, T>(&self, key: &CorrelationKey, outputs: &'a [T]) -> &'a [T] {
        if outputs.is_empty() {
            return outputs;
        }

        let idx = match self.policy {
            RoutingPolicy::Broadcast => return outputs,
            RoutingPolicy::RoundRobin => self.counter.fetch_add(1, Ordering::Relaxed) % outputs.len(),
            RoutingPolicy::SessionAffinity => affinity_index(key, outputs.len()),
        };
        &outputs[idx..=idx]
    }

    /// Records routed by the round-robin counter so far
    pub fn rotations(&self) -> usize {
        self.counter.load(Ordering::Relaxed)
    }
}

/// Output index for a correlation key under session affinity.
///
/// Pure function of the key and output count. Callers guarantee
/// `output_count > 0`; [`Router::select`] returns early on empty outputs.
#[inline]
pub(crate) fn affinity_index(key: &CorrelationKey, output_count: usize) -> usize {
    debug_assert!(output_count > 0);
    (key.stable_hash() % output_count as u64) as usize
}
