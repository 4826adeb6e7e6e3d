// crates/mooring-escrow/src/lib.rs
//
// mooring-escrow: vote-escrow lock ledger for the Mooring Protocol.
//
// Locks $MOR until a future week boundary and derives a linearly-decaying
// balance from the lock, with full historical queryability via append-only
// bias/slope checkpoint histories. Also hosts the delegation ledger (pooled
// positions settled by deferred injection) and the proxy registry (1:1
// stand-ins for migrated legacy positions).
//
// All monetary values are tracked in knots (the smallest unit of $MOR).

pub mod delegation;
pub mod escrow;
pub mod penalty;
pub mod point;
pub mod proxy;

// Re-export key types for ergonomic access from downstream crates.
pub use delegation::{DelegateRecord, DelegationLedger};
pub use escrow::{Lock, VoteEscrow, WithdrawOutcome};
pub use penalty::{compute_penalty, PenaltyConfig, BPS_DENOMINATOR};
pub use point::Point;
pub use proxy::{ProxyRegistry, DEFAULT_CONVERT_WINDOW};
