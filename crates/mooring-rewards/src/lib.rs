// crates/mooring-rewards/src/lib.rs
//
// mooring-rewards: checkpoint-based revenue distribution for the Mooring
// Protocol.
//
// Reward-token injections are checkpointed into weekly buckets and claimed
// pro rata to time-weighted historical escrow balances. The distributor only
// reads the escrow ledger; it never mutates locks.

pub mod distributor;

pub use distributor::{
    RewardDistributor, MAX_CLAIM_WEEKS, MAX_SUPPLY_CHECKPOINT_WEEKS, MAX_TOKEN_CHECKPOINT_WEEKS,
    TOKEN_CHECKPOINT_DEADLINE,
};
