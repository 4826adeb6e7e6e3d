// crates/mooring-escrow/src/point.rs
//
// Bias/slope checkpoints.
//
// A Point is a linear-decay snapshot: balance(t) = max(0, bias - slope * (t - ts)).
// Histories are append-only, timestamp-ordered sequences of Points; historical
// queries binary-search for the last Point at or before the query time.

use serde::{Deserialize, Serialize};

use mooring_core::{Knots, Timestamp};

/// A linear-decay snapshot of a balance (per-account or global).
///
/// Bias and slope are signed so that global accounting can aggregate
/// per-account deltas additively; evaluated balances floor at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    /// Balance at `ts`, in knots.
    pub bias: i128,
    /// Decay per second, in knots.
    pub slope: i128,
    /// Timestamp this snapshot was taken at.
    pub ts: Timestamp,
}

impl Point {
    /// The zero point at `ts`.
    pub fn zero(ts: Timestamp) -> Self {
        Self {
            bias: 0,
            slope: 0,
            ts,
        }
    }

    /// Evaluate the decayed balance at time `t >= self.ts`, floored at zero.
    pub fn eval(&self, t: Timestamp) -> Knots {
        let dt = (t - self.ts) as i128;
        let value = self.bias - self.slope * dt;
        if value < 0 {
            0
        } else {
            value as u64
        }
    }
}

/// Binary-search `points` (timestamp-ordered) for the last point with
/// `ts <= t`. Returns `None` if every point is later than `t`.
pub(crate) fn last_point_at(points: &[Point], t: Timestamp) -> Option<Point> {
    let idx = points.partition_point(|p| p.ts <= t);
    if idx == 0 {
        None
    } else {
        Some(points[idx - 1])
    }
}
