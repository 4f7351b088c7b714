//! Record identity
//!
//! A record id is 24 printable ASCII bytes. The first 20 are the correlation
//! key shared by a request and its answers; the last 4 are a variant suffix
//! (retransmission or ACK discriminator) that may differ between them.

use rand::RngCore;
use std::fmt;

/// Length of a full record id
pub const ID_LEN: usize = 24;

/// Length of the correlation key prefix
pub const CORRELATION_LEN: usize = 20;

/// Length of the variant suffix
pub const VARIANT_LEN: usize = ID_LEN - CORRELATION_LEN;

/// 24-byte record identity
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RecordId([u8; ID_LEN]);

impl RecordId {
    /// Validate and copy an id from raw bytes.
    ///
    /// Returns `None` unless `bytes` is exactly 24 printable, non-space
    /// ASCII characters.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != ID_LEN || !bytes.iter().all(u8::is_ascii_graphic) {
            return None;
        }
        let mut id = [0u8; ID_LEN];
        id.copy_from_slice(bytes);
        Some(Self(id))
    }

    /// Fresh random id: 12 random bytes, hex encoded
    pub fn generate() -> Self {
        let mut raw = [0u8; ID_LEN / 2];
        rand::thread_rng().fill_bytes(&mut raw);

        let mut id = [0u8; ID_LEN];
        id.copy_from_slice(hex::encode(raw).as_bytes());
        Self(id)
    }

    /// Same correlation key, different variant suffix
    pub fn with_variant(&self, variant: [u8; VARIANT_LEN]) -> Option<Self> {
        let mut id = self.0;
        id[CORRELATION_LEN..].copy_from_slice(&variant);
        Self::from_bytes(&id)
    }

    /// Raw id bytes
    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// Correlation key (first 20 bytes)
    #[inline(always)]
    pub fn correlation_key(&self) -> CorrelationKey {
        let mut key = [0u8; CORRELATION_LEN];
        key.copy_from_slice(&self.0[..CORRELATION_LEN]);
        CorrelationKey(key)
    }

    /// Variant suffix (last 4 bytes)
    #[inline(always)]
    pub fn variant(&self) -> &[u8] {
        &self.0[CORRELATION_LEN..]
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            write!(f, "{}", b as char)?;
        }
        Ok(())
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self)
    }
}

/// 20-byte correlation key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct CorrelationKey([u8; CORRELATION_LEN]);

impl CorrelationKey {
    /// Raw key bytes
    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8; CORRELATION_LEN] {
        &self.0
    }

    /// Stable hash using FNV-1a (fast, good distribution).
    ///
    /// Must never change between releases: session affinity depends on the
    /// same key always landing in the same bucket.
    #[inline(always)]
    pub fn stable_hash(&self) -> u64 {
        const FNV_OFFSET: u64 = 0xcbf29ce484222325;
        const FNV_PRIME: u64 = 0x100000001b3;

        let mut h = FNV_OFFSET;
        for &byte in &self.0 {
            h ^= byte as u64;
            h = h.wrapping_mul(FNV_PRIME);
        }
        h
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            write!(f, "{}", b as char)?;
        }
        Ok(())
    }
}

impl fmt::Debug for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CorrelationKey({})", self)
    }
}
