//! C3: the three bounded, wall-time-evicted FIFOs used for loop avoidance
//! and duplicate suppression (spec §3.4).
//!
//! All three caches share one generic implementation: a fixed-capacity
//! ring of `(key, value, insertion time)` triples. Lookups evict anything
//! past the retention window before searching; insertion evicts the
//! oldest entry once the ring is full.

use heapless::Deque;

/// Entries older than this are evicted on the next lookup or insert,
/// regardless of which cache they live in.
pub const DEDUP_RETENTION_MS: u32 = 30_000;

struct Entry<K, V> {
    key: K,
    value: V,
    inserted_ms: u32,
}

pub struct TimedRingCache<K, V, const CAP: usize> {
    ring: Deque<Entry<K, V>, CAP>,
}

impl<K, V, const CAP: usize> TimedRingCache<K, V, CAP>
where
    K: PartialEq,
{
    pub const fn new() -> Self {
        Self { ring: Deque::new() }
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    fn evict_stale(&mut self, now_ms: u32) {
        while let Some(front) = self.ring.front() {
            if now_ms.wrapping_sub(front.inserted_ms) > DEDUP_RETENTION_MS {
                self.ring.pop_front();
            } else {
                break;
            }
        }
    }

    /// Evicts stale entries, then reports whether `key` is still present.
    pub fn contains(&mut self, key: &K, now_ms: u32) -> bool {
        self.evict_stale(now_ms);
        self.ring.iter().any(|e| &e.key == key)
    }

    /// Evicts stale entries, then returns the value for `key` if present.
    pub fn get(&mut self, key: &K, now_ms: u32) -> Option<&V> {
        self.evict_stale(now_ms);
        self.ring.iter().find(|e| &e.key == key).map(|e| &e.value)
    }

    /// Record `key -> value`. Caller is expected to have already checked
    /// `contains` (the dedup check and the insert are two separate steps
    /// in every call site in this crate) — duplicate keys are not merged,
    /// they simply coexist until evicted, which would violate the "no
    /// duplicate keys" invariant if callers get this wrong.
    pub fn insert(&mut self, key: K, value: V, now_ms: u32) {
        self.evict_stale(now_ms);
        if self.ring.is_full() {
            self.ring.pop_front();
        }
        // Capacity is enforced above; a fixed-size Deque never rejects a
        // push once room has been freed.
        let _ = self.ring.push_back(Entry {
            key,
            value,
            inserted_ms: now_ms,
        });
    }
}

impl<K, V, const CAP: usize> Default for TimedRingCache<K, V, CAP>
where
    K: PartialEq,
{
    fn default() -> Self {
        Self::new()
    }
}
