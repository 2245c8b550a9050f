//! Ring Buffer - Bounded Store of Recent Market Payloads
//!
//! Holds the most recent OpenBook market accounts streamed before their
//! matching pool launch. A launch looks its market up here instead of
//! making a slow RPC round trip; when the market is not present the buy
//! is abandoned.
//!
//! Concurrency: one writer (the market stream) and many readers
//! (correlation attempts). Each slot carries its own lock, so an insert
//! only ever contends with a reader cloning that one slot's `Arc`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

/// Default capacity used by the market stream.
pub const DEFAULT_CAPACITY: usize = 5000;

/// Immutable payload plus the sequence number assigned on insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Monotonic insertion sequence (0-based).
    pub sequence: u64,
    /// Raw account bytes as received from the stream.
    pub payload: Vec<u8>,
}

/// Fixed-capacity circular store with newest-first pattern lookup.
///
/// Eviction is purely positional: record `n` lives in slot `n % capacity`
/// until record `n + capacity` replaces it. Reads never promote entries.
#[derive(Debug)]
pub struct RingBuffer {
    /// One lock per slot.
    slots: Box<[RwLock<Option<Arc<RawRecord>>>]>,
    /// Next sequence number to assign.
    cursor: AtomicU64,
    /// Byte offset at which `find_pattern` compares the key.
    key_offset: usize,
    /// Number of `find_pattern` calls served.
    lookups: AtomicU64,
}

impl RingBuffer {
    /// Create a buffer that matches keys at offset 0.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self::with_key_offset(capacity, 0)
    }

    /// Create a buffer that matches keys at a fixed payload offset.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn with_key_offset(capacity: usize, key_offset: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be positive");
        let slots = (0..capacity).map(|_| RwLock::new(None)).collect();
        Self {
            slots,
            cursor: AtomicU64::new(0),
            key_offset,
            lookups: AtomicU64::new(0),
        }
    }

    /// Maximum number of records held.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of records currently held.
    ///
    /// Counts assigned sequences, so while an insert is in flight this
    /// can be one ahead of what `snapshot` returns.
    pub fn len(&self) -> usize {
        let inserted = self.cursor.load(Ordering::Acquire);
        usize::try_from(inserted).map_or(self.capacity(), |n| n.min(self.capacity()))
    }

    /// Whether nothing has been inserted yet.
    pub fn is_empty(&self) -> bool {
        self.cursor.load(Ordering::Acquire) == 0
    }

    /// Offset used by `find_pattern`.
    pub fn key_offset(&self) -> usize {
        self.key_offset
    }

    /// Total lookups performed since construction.
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Insert a payload, overwriting the oldest record once full.
    ///
    /// Returns the sequence number assigned to the record.
    pub fn enqueue(&self, payload: Vec<u8>) -> u64 {
        let sequence = self.cursor.fetch_add(1, Ordering::AcqRel);
        let record = Arc::new(RawRecord { sequence, payload });
        let slot = self.slot_index(sequence);
        *self.slots[slot].write() = Some(record);
        sequence
    }

    /// Find the newest record whose payload holds `key` at the key offset.
    ///
    /// Scans from the most recently assigned sequence backwards over at
    /// most `capacity` slots. A slot is only accepted when it holds the
    /// sequence the scan expects there; a slot whose new record has not
    /// landed yet still holds an evicted one and is skipped.
    pub fn find_pattern(&self, key: &[u8]) -> Option<Arc<RawRecord>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);

        if key.is_empty() {
            return None;
        }

        let head = self.cursor.load(Ordering::Acquire);
        let span = head.min(self.capacity() as u64);

        for back in 1..=span {
            let sequence = head - back;
            let record = self.slots[self.slot_index(sequence)].read().clone();
            let Some(record) = record.filter(|r| r.sequence == sequence) else {
                // Sequence assigned but the writer has not stored it yet.
                continue;
            };
            if self.matches(&record.payload, key) {
                return Some(record);
            }
        }

        None
    }

    /// Records currently held, oldest first.
    pub fn snapshot(&self) -> Vec<Arc<RawRecord>> {
        let mut records: Vec<_> = self
            .slots
            .iter()
            .filter_map(|slot| slot.read().clone())
            .collect();
        records.sort_by_key(|r| r.sequence);
        records
    }

    fn matches(&self, payload: &[u8], key: &[u8]) -> bool {
        payload
            .get(self.key_offset..self.key_offset + key.len())
            .is_some_and(|window| window == key)
    }

    fn slot_index(&self, sequence: u64) -> usize {
        (sequence % self.capacity() as u64) as usize
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
