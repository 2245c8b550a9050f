//! Property-Based Tests — Domain Layer Invariants
//!
//! Uses `proptest` to verify that the ring buffer, layout decoders and
//! swap pricing maintain their invariants across random inputs.

use proptest::prelude::*;

use launch_sniper::domain::layout::{DecodedAccount, LayoutError, MARKET_STATE_LEN, POOL_STATE_LEN};
use launch_sniper::domain::ring_buffer::RingBuffer;
use launch_sniper::domain::swap::min_amount_out;

const KEY_OFFSET: usize = 4;

/// Payload carrying `id` as a little-endian u64 at `KEY_OFFSET`.
fn payload(id: u64) -> Vec<u8> {
    let mut data = vec![0xAB; KEY_OFFSET];
    data.extend_from_slice(&id.to_le_bytes());
    data
}

// ── Ring Buffer Properties ──────────────────────────────────

proptest! {
    /// After n inserts the buffer holds exactly the last min(n, C), in order.
    #[test]
    fn ring_keeps_last_capacity_records_in_order(
        capacity in 1usize..64,
        inserts in 0u64..256,
    ) {
        let ring = RingBuffer::with_key_offset(capacity, KEY_OFFSET);
        for id in 0..inserts {
            ring.enqueue(payload(id));
        }

        let held: Vec<u64> = ring.snapshot().iter().map(|r| r.sequence).collect();
        let expected_len = (inserts as usize).min(capacity);
        let first = inserts - expected_len as u64;
        let expected: Vec<u64> = (first..inserts).collect();

        prop_assert_eq!(ring.len(), expected_len);
        prop_assert_eq!(held, expected);
    }

    /// A key is found iff its record is still held.
    #[test]
    fn lookup_finds_exactly_the_held_keys(
        capacity in 1usize..32,
        inserts in 1u64..128,
        probe in 0u64..160,
    ) {
        let ring = RingBuffer::with_key_offset(capacity, KEY_OFFSET);
        for id in 0..inserts {
            ring.enqueue(payload(id));
        }

        let oldest_held = inserts.saturating_sub(capacity as u64);
        let found = ring.find_pattern(&probe.to_le_bytes());

        if probe >= oldest_held && probe < inserts {
            let record = found.expect("held key must be found");
            prop_assert_eq!(record.sequence, probe);
        } else {
            prop_assert!(found.is_none());
        }
    }

    /// With duplicate keys the newest copy wins.
    #[test]
    fn lookup_prefers_newest_duplicate(
        capacity in 2usize..32,
        copies in 2u64..8,
    ) {
        let ring = RingBuffer::with_key_offset(capacity, KEY_OFFSET);
        let mut last = 0;
        for _ in 0..copies {
            last = ring.enqueue(payload(7));
        }
        let record = ring.find_pattern(&7u64.to_le_bytes()).unwrap();
        prop_assert_eq!(record.sequence, last);
    }
}

// ── Layout Properties ───────────────────────────────────────

proptest! {
    /// Any payload whose length is not a known layout is a typed error.
    #[test]
    fn decode_selects_by_length(data in proptest::collection::vec(any::<u8>(), 0..1024)) {
        let result = DecodedAccount::decode(&data);
        match data.len() {
            POOL_STATE_LEN | MARKET_STATE_LEN => prop_assert!(result.is_ok()),
            len => prop_assert_eq!(result, Err(LayoutError::UnknownLength(len))),
        }
    }
}

// ── Swap Pricing Properties ─────────────────────────────────

proptest! {
    /// The minimum output never exceeds the output reserve.
    #[test]
    fn min_out_bounded_by_reserve(
        amount in 0u64..u64::MAX / 2,
        reserve_in in 0u64..u64::MAX / 2,
        reserve_out in 0u64..u64::MAX / 2,
        slippage in 0u16..10_000,
    ) {
        let out = min_amount_out(amount, reserve_in, reserve_out, slippage);
        prop_assert!(out <= reserve_out);
    }

    /// More slippage tolerance never raises the floor.
    #[test]
    fn min_out_monotonic_in_slippage(
        amount in 1u64..1_000_000_000,
        reserve_in in 1u64..1_000_000_000_000,
        reserve_out in 1u64..1_000_000_000_000,
        low in 0u16..5_000,
        extra in 0u16..5_000,
    ) {
        let tight = min_amount_out(amount, reserve_in, reserve_out, low);
        let loose = min_amount_out(amount, reserve_in, reserve_out, low + extra);
        prop_assert!(loose <= tight);
    }
}
