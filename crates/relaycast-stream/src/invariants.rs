//! Debug assertion macros for adapter invariants.
//!
//! They are only active in debug builds (`debug_assert!`), so there is
//! zero overhead in release builds.

// =============================================================================
// Single In-Flight Write
// =============================================================================

/// Assert that `start_send` is only called once the previous write finished.
///
/// **Invariant**: `start_send` follows a `poll_ready` that returned `Ready(Ok)`
///
/// Used in: `EmitterSink::start_send()`
macro_rules! debug_assert_ready_for_send {
    ($in_flight:expr) => {
        debug_assert!(
            $in_flight.is_none(),
            "single in-flight violated: start_send called before poll_ready completed"
        )
    };
}

// =============================================================================
// Fused End Of Stream
// =============================================================================

/// Assert that nothing is yielded after the terminal item.
///
/// **Invariant**: once `poll_next` returns `None`, the receiver is finished
///
/// Used in: `RelayStream::poll_next()`
macro_rules! debug_assert_fused {
    ($item:expr, $finished:expr) => {
        debug_assert!(
            $item.is_some() || $finished,
            "fused stream violated: end of stream before the terminal slot"
        )
    };
}

pub(crate) use debug_assert_fused;
pub(crate) use debug_assert_ready_for_send;
