// crates/mooring-core/src/traits.rs

use serde::{Deserialize, Serialize};

use crate::error::MooringError;
use crate::identity::AccountId;
use crate::time::Timestamp;
use crate::token::Knots;

/// Trait for the external fungible value ledger (base token and reward token).
///
/// The escrow and rewards ledgers assume these calls either fully succeed or
/// error, aborting the enclosing operation. Implementations must not leave
/// partial effects behind on error.
pub trait TokenLedger {
    /// Debit `amount` from `from` and credit it to `to`, on behalf of `from`.
    fn transfer_from(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Knots,
    ) -> Result<(), MooringError>;

    /// Credit `amount` from `from` to `to`.
    fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Knots,
    ) -> Result<(), MooringError>;

    /// Current balance of `account`.
    fn balance_of(&self, account: &AccountId) -> Knots;
}

/// Trait for the authorization layer.
///
/// The core only needs a boolean capability check at operation boundaries
/// (penalty configuration, delegate whitelisting, checkpoint toggles); role
/// management itself lives outside this workspace.
pub trait Authorizer {
    /// Returns `true` if `account` may perform admin-gated operations.
    fn is_authorized(&self, account: &AccountId) -> bool;
}

/// A position read from the legacy source during migration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LegacyPosition {
    /// Locked amount in knots.
    pub amount: Knots,
    /// Unlock timestamp of the legacy lock.
    pub end: Timestamp,
    /// Boosted share held at migration time, in knots. Recorded for
    /// reporting; the proxy lock is seeded from `amount`/`end` only.
    pub boosted_share: Knots,
}

/// Trait for the legacy position source consulted once during migration.
pub trait LegacyPositionSource {
    /// Read the legacy position for `account`, if any.
    fn position_of(&self, account: &AccountId) -> Option<LegacyPosition>;
}
