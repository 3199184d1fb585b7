//! Debug assertion macros for replay-buffer and response-ring invariants.
//!
//! Only active in debug builds (`#[cfg(debug_assertions)]`), so there is zero
//! overhead in release builds.

// =============================================================================
// INV-BUF-01: Cursor bounded by size
// =============================================================================

/// Assert `0 <= cursor <= size`.
macro_rules! debug_assert_cursor_bounded {
    ($cursor:expr, $size:expr) => {
        debug_assert!(
            $cursor <= $size,
            "INV-BUF-01 violated: cursor {} exceeds size {}",
            $cursor,
            $size
        )
    };
}

// =============================================================================
// INV-BUF-02: Elastic presence matches size
// =============================================================================

/// Assert the elastic area is present iff `size` exceeds the fixed capacity.
macro_rules! debug_assert_elastic_matches_size {
    ($has_elastic:expr, $size:expr, $default_size:expr) => {
        debug_assert!(
            $has_elastic == ($size > $default_size),
            "INV-BUF-02 violated: elastic presence {} inconsistent with size {} (default {})",
            $has_elastic,
            $size,
            $default_size
        )
    };
}

// =============================================================================
// INV-SEQ-01: required_sn monotonic
// =============================================================================

/// Assert that `required_sn` never decreases across a chunk admission.
macro_rules! debug_assert_required_sn_monotonic {
    ($old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "INV-SEQ-01 violated: required_sn decreased from {} to {}",
            $old,
            $new
        )
    };
}

// =============================================================================
// INV-RING-01: Response ring writable slot
// =============================================================================

/// Assert that a slot chosen for write is either invalid or past its deadline.
macro_rules! debug_assert_slot_writable {
    ($valid:expr, $deadline:expr, $now:expr) => {
        debug_assert!(
            !$valid || $deadline <= $now,
            "INV-RING-01 violated: overwriting a live slot (deadline {} > now {})",
            $deadline,
            $now
        )
    };
}

pub(crate) use debug_assert_cursor_bounded;
pub(crate) use debug_assert_elastic_matches_size;
pub(crate) use debug_assert_required_sn_monotonic;
pub(crate) use debug_assert_slot_writable;
