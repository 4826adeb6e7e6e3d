// crates/mooring-escrow/src/penalty.rs
//
// Early-withdraw penalty computation.
//
// Leaving a lock before its end costs a penalty proportional to the weeks
// remaining: penalty = bps_per_week * remaining_weeks * amount / 10_000,
// capped at the withdrawn amount. The penalty is split between the protocol
// treasury and the redistribution pool; exempted accounts pay nothing.

use serde::{Deserialize, Serialize};

use mooring_core::Knots;

/// Basis-point denominator: 10_000 bps = 100%.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Penalty parameters for early withdrawal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PenaltyConfig {
    /// Penalty in basis points charged per remaining whole week.
    pub bps_per_week: u64,
    /// Share of the collected penalty routed to the treasury, in basis
    /// points. The remainder goes to the redistribution pool.
    pub treasury_share_bps: u64,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            // 0.5% per remaining week
            bps_per_week: 50,
            // Half to treasury, half to redistribution
            treasury_share_bps: 5_000,
        }
    }
}

/// Compute the early-withdraw penalty (in knots) for withdrawing `amount`
/// with `remaining_weeks` whole weeks left on the lock.
///
/// Never exceeds `amount`.
pub fn compute_penalty(amount: Knots, remaining_weeks: u64, bps_per_week: u64) -> Knots {
    let penalty =
        (amount as u128 * bps_per_week as u128 * remaining_weeks as u128) / BPS_DENOMINATOR as u128;
    (penalty as u64).min(amount)
}
