//! OpenRelay Common - Shared types for the record relay
//!
//! This crate provides the primitives every other crate speaks:
//! - Record kinds and their wire bytes
//! - Record identity (correlation key + variant suffix)
//! - Nanosecond timestamps and the latency sentinel
//! - Error handling
//!
//! # Record Identity
//!
//! ```text
//!   0                   20    24
//!   ├───────────────────┼─────┤
//!   │  correlation key  │ var │
//!   └───────────────────┴─────┘
//! ```
//!
//! The correlation key is shared by a request and every record that answers
//! it. The variant suffix may differ between those records.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod identity;

pub use error::*;
pub use identity::{CorrelationKey, RecordId, CORRELATION_LEN, ID_LEN, VARIANT_LEN};

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Latency value for records where latency does not apply
pub const LATENCY_UNKNOWN: i64 = -1;

/// Kind of captured record.
///
/// The discriminant is the ASCII digit carried in the first envelope field.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Request seen on the wire
    Request = b'1',
    /// Response paired with a request
    Response = b'2',
    /// Response produced by replaying a request
    ReplayReport = b'3',
}

impl RecordKind {
    /// Convert from the wire byte
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            b'1' => Some(Self::Request),
            b'2' => Some(Self::Response),
            b'3' => Some(Self::ReplayReport),
            _ => None,
        }
    }

    /// Wire byte for this kind
    #[inline(always)]
    pub fn as_wire(self) -> u8 {
        self as u8
    }

    /// Whether this record answers a request
    #[inline(always)]
    pub fn is_response(self) -> bool {
        !matches!(self, Self::Request)
    }
}

/// Nanosecond wall-clock timestamp assigned by the producer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Get current timestamp (nanoseconds since epoch)
    #[inline(always)]
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as i64;
        Self(nanos)
    }

    /// Wrap a raw nanosecond value
    #[inline(always)]
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Get nanoseconds value
    #[inline(always)]
    pub fn as_nanos(&self) -> i64 {
        self.0
    }
}

/// High-performance counter for lock-free metrics
#[derive(Debug, Default)]
pub struct AtomicCounter(AtomicU64);

impl AtomicCounter {
    /// Create new counter
    pub const fn new(value: u64) -> Self {
        Self(AtomicU64::new(value))
    }

    /// Increment and return previous value
    #[inline(always)]
    pub fn inc(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    /// Add value and return previous
    #[inline(always)]
    pub fn add(&self, val: u64) -> u64 {
        self.0.fetch_add(val, Ordering::Relaxed)
    }

    /// Get current value
    #[inline(always)]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}
