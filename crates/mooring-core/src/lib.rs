// crates/mooring-core/src/lib.rs
//
// mooring-core: Core types, traits, and time/unit primitives for the
// Mooring Protocol.
//
// This is the leaf crate that the escrow and rewards ledgers depend on.
// It defines the canonical identity and timestamp types, the week math
// every ledger shares, the protocol-wide error enum, and the trait
// interfaces to the external collaborators (fungible token ledger,
// authorization layer, legacy position source).

pub mod error;
pub mod identity;
pub mod memory;
pub mod time;
pub mod token;
pub mod traits;

// Re-export key types for ergonomic access from downstream crates.
// Usage: `use mooring_core::AccountId;`

// Identity types
pub use identity::{derive_proxy_id, AccountId};

// Time types and week math
pub use time::{week_floor, Timestamp, MAX_LOCK_DURATION, WEEK};

// Token units
pub use token::{Knots, Mor, KNOTS_PER_MOR};

// Error type
pub use error::MooringError;

// Traits
pub use traits::{Authorizer, LegacyPosition, LegacyPositionSource, TokenLedger};

// In-memory reference implementations
pub use memory::{AllowList, InMemoryLegacy, InMemoryToken};
