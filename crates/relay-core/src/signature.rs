//! Bounded cache for thinking-block signatures.
//!
//! Signatures arrive on thinking blocks and must be replayed on the next
//! turn's request. The mapping is bounded with FIFO eviction — an
//! unbounded map here grows without limit on long-lived relays.

use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};

/// Default capacity used by the server wiring.
pub const SIGNATURE_CACHE_CAPACITY: usize = 10_000;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Stable content hash for cache keys (FNV-1a, hex).
///
/// FNV rather than `DefaultHasher` so keys stay stable across Rust
/// versions and restarts.
pub fn content_key(content: &str) -> String {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in content.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    format!("{hash:016x}")
}

/// Fixed-capacity FIFO map from content hash to signature.
pub struct SignatureCache {
    inner: RwLock<Inner>,
    capacity: usize,
}

struct Inner {
    entries: HashMap<String, String>,
    order: VecDeque<String>,
}

impl SignatureCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::with_capacity(capacity.min(1024)),
                order: VecDeque::with_capacity(capacity.min(1024)),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Store a signature; evicts the oldest entry at capacity.
    pub fn insert(&self, key: impl Into<String>, signature: impl Into<String>) {
        let key = key.into();
        let mut inner = self.inner.write();

        if inner.entries.insert(key.clone(), signature.into()).is_none() {
            inner.order.push_back(key);
            if inner.order.len() > self.capacity {
                if let Some(oldest) = inner.order.pop_front() {
                    inner.entries.remove(&oldest);
                }
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.read().entries.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
