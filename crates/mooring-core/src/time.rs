// crates/mooring-core/src/time.rs
//
// Week math shared by every ledger in the workspace.
//
// All escrow decay scheduling and reward bucketing happens on fixed-length
// week boundaries. Lock end times are always rounded down to a boundary, so
// scheduled slope changes and reward buckets line up exactly.

use chrono::Utc;

/// Unix timestamp in seconds. Ledger operations take `now` explicitly so the
/// core stays deterministic; `now()` below is a convenience for embedders.
pub type Timestamp = i64;

/// One week in seconds. The epoch length for decay scheduling and reward
/// bucketing.
pub const WEEK: i64 = 7 * 24 * 3600;

/// Maximum lock horizon: 4 years in seconds.
pub const MAX_LOCK_DURATION: i64 = 4 * 365 * 24 * 3600;

/// Round a timestamp down to its week boundary.
pub fn week_floor(ts: Timestamp) -> Timestamp {
    (ts / WEEK) * WEEK
}

/// Current wall-clock time as a unix timestamp.
pub fn now() -> Timestamp {
    Utc::now().timestamp()
}
