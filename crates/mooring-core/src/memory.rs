// crates/mooring-core/src/memory.rs
//
// In-memory reference implementations of the external-interface traits.
//
// Used by the escrow and rewards test suites and by embedders that want a
// self-contained ledger (simulations, local tooling). Production deployments
// substitute adapters over the real token ledger and authorization layer.

use std::collections::{HashMap, HashSet};

use crate::error::MooringError;
use crate::identity::AccountId;
use crate::token::{Knots, Mor};
use crate::traits::{Authorizer, LegacyPosition, LegacyPositionSource, TokenLedger};

/// A simple in-memory fungible token ledger.
pub struct InMemoryToken {
    balances: HashMap<AccountId, Knots>,
}

impl InMemoryToken {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self {
            balances: HashMap::new(),
        }
    }

    /// Mint `amount` knots to `account` (test/bootstrap convenience).
    pub fn mint(&mut self, account: &AccountId, amount: Knots) {
        let bal = self.balances.entry(*account).or_insert(0);
        *bal = bal.saturating_add(amount);
    }

    fn debit(&mut self, from: &AccountId, amount: Knots) -> Result<(), MooringError> {
        let bal = self.balances.entry(*from).or_insert(0);
        if *bal < amount {
            return Err(MooringError::Token(format!(
                "insufficient balance: have {}, need {}",
                Mor(*bal),
                Mor(amount)
            )));
        }
        *bal -= amount;
        Ok(())
    }
}

impl Default for InMemoryToken {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenLedger for InMemoryToken {
    fn transfer_from(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Knots,
    ) -> Result<(), MooringError> {
        self.debit(from, amount)?;
        let bal = self.balances.entry(*to).or_insert(0);
        *bal = bal.saturating_add(amount);
        Ok(())
    }

    fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Knots,
    ) -> Result<(), MooringError> {
        self.transfer_from(from, to, amount)
    }

    fn balance_of(&self, account: &AccountId) -> Knots {
        self.balances.get(account).copied().unwrap_or(0)
    }
}

/// An allow-list authorizer: a fixed set of admin accounts.
pub struct AllowList {
    admins: HashSet<AccountId>,
}

impl AllowList {
    /// Create an allow-list from the given admin accounts.
    pub fn new(admins: impl IntoIterator<Item = AccountId>) -> Self {
        Self {
            admins: admins.into_iter().collect(),
        }
    }
}

impl Authorizer for AllowList {
    fn is_authorized(&self, account: &AccountId) -> bool {
        self.admins.contains(account)
    }
}

/// A fixed table of legacy positions, read once during migration.
pub struct InMemoryLegacy {
    positions: HashMap<AccountId, LegacyPosition>,
}

impl InMemoryLegacy {
    /// Create an empty legacy source.
    pub fn new() -> Self {
        Self {
            positions: HashMap::new(),
        }
    }

    /// Record a legacy position for `account`.
    pub fn insert(&mut self, account: AccountId, position: LegacyPosition) {
        self.positions.insert(account, position);
    }
}

impl Default for InMemoryLegacy {
    fn default() -> Self {
        Self::new()
    }
}

impl LegacyPositionSource for InMemoryLegacy {
    fn position_of(&self, account: &AccountId) -> Option<LegacyPosition> {
        self.positions.get(account).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acct(b: u8) -> AccountId {
        [b; 32]
    }

    #[test]
    fn test_mint_and_balance() {
        let mut token = InMemoryToken::new();
        token.mint(&acct(1), 100);
        assert_eq!(token.balance_of(&acct(1)), 100);
        assert_eq!(token.balance_of(&acct(2)), 0);
    }

    #[test]
    fn test_transfer() {
        let mut token = InMemoryToken::new();
        token.mint(&acct(1), 100);
        token.transfer(&acct(1), &acct(2), 40).unwrap();
        assert_eq!(token.balance_of(&acct(1)), 60);
        assert_eq!(token.balance_of(&acct(2)), 40);
    }

    #[test]
    fn test_transfer_insufficient() {
        let mut token = InMemoryToken::new();
        token.mint(&acct(1), 10);
        let result = token.transfer(&acct(1), &acct(2), 40);
        assert!(result.is_err());
        // No partial effect
        assert_eq!(token.balance_of(&acct(1)), 10);
        assert_eq!(token.balance_of(&acct(2)), 0);
    }

    #[test]
    fn test_zero_transfer_always_succeeds() {
        let mut token = InMemoryToken::new();
        assert!(token.transfer(&acct(1), &acct(2), 0).is_ok());
    }

    #[test]
    fn test_allow_list() {
        let auth = AllowList::new([acct(9)]);
        assert!(auth.is_authorized(&acct(9)));
        assert!(!auth.is_authorized(&acct(1)));
    }
}
