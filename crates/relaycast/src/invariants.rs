//! Debug assertion macros for relay and hub invariants.
//!
//! They are only active in debug builds (`debug_assert!`), so there is
//! zero overhead in release builds.

// =============================================================================
// Bounded Count
// =============================================================================

/// Assert that the number of undrained slots does not exceed capacity.
///
/// **Invariant**: `0 ≤ count ≤ capacity`
///
/// Used in: `RelayState::push()` after advancing tail
macro_rules! debug_assert_bounded_count {
    ($count:expr, $capacity:expr) => {
        debug_assert!(
            $count <= $capacity,
            "bounded count violated: count {} exceeds capacity {}",
            $count,
            $capacity
        )
    };
}

// =============================================================================
// Slot Occupancy
// =============================================================================

/// Assert that a slot is free before the producer writes into it, and
/// occupied before the consumer reads from it.
///
/// **Invariant**: `ring[i] is Some ⟺ i ∈ [head, head + count)`
///
/// Used in: `RelayState::push()` and `RelayState::pop()`
macro_rules! debug_assert_slot_state {
    ($slot:expr, occupied, $idx:expr) => {
        debug_assert!(
            $slot.is_some(),
            "slot occupancy violated: reading empty slot {}",
            $idx
        )
    };
    ($slot:expr, free, $idx:expr) => {
        debug_assert!(
            $slot.is_none(),
            "slot occupancy violated: overwriting occupied slot {}",
            $idx
        )
    };
}

// =============================================================================
// Exclusive Waiters
// =============================================================================

/// Assert that producer and consumer waiter queues are never both non-empty.
///
/// **Invariant**: producers wait only while `count == capacity`, consumers wait
/// only while `count == 0`; both at once would need `capacity == 0`.
///
/// Used in: every relay state transition that parks or releases a waiter
macro_rules! debug_assert_waiters_exclusive {
    ($state:expr) => {
        debug_assert!(
            $state.producers.is_empty() || $state.consumers.is_empty(),
            "exclusive waiters violated: {} producer(s) and {} consumer(s) parked (count {})",
            $state.producers.len(),
            $state.consumers.len(),
            $state.count
        )
    };
}

// =============================================================================
// Single Terminal
// =============================================================================

/// Assert that no value is written after the terminal marker.
///
/// **Invariant**: the terminal slot is the last slot ever written
///
/// Used in: `RelayState::push()`
macro_rules! debug_assert_open_stream {
    ($terminated:expr) => {
        debug_assert!(
            !$terminated,
            "single terminal violated: write after terminal slot"
        )
    };
}

// =============================================================================
// Re-exports for crate-internal use
// =============================================================================

pub(crate) use debug_assert_bounded_count;
pub(crate) use debug_assert_open_stream;
pub(crate) use debug_assert_slot_state;
pub(crate) use debug_assert_waiters_exclusive;
