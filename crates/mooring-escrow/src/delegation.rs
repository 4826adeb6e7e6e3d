// crates/mooring-escrow/src/delegation.rs
//
// Delegation ledger: many accounts pool locked value behind one delegate's
// lock.
//
// A deposit credits the delegate's internal delegated/not-injected ledger
// immediately (a promise); the backing lock is topped up later by an
// authorized injection bounded by the uninjected amount (the settle). The
// two-phase split exists because moving value into the delegate's lock
// cannot happen atomically with the crediting step. Withdrawal from the
// delegate's lock is blocked until injection is complete, rather than
// silently under-paying.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use mooring_core::{AccountId, Authorizer, Knots, Mor, MooringError, Timestamp, TokenLedger};

use crate::escrow::{VoteEscrow, WithdrawOutcome};

/// A pooled position backed by one delegate lock.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DelegateRecord {
    /// Total value contributed by depositors, in knots.
    pub delegated_amount: Knots,
    /// Contributed value not yet injected into the backing lock, in knots.
    pub not_injected_amount: Knots,
    /// End of the delegate's backing lock at the last deposit.
    pub lock_end: Timestamp,
    /// Cap on a single early withdrawal by the delegate, in knots.
    pub early_withdraw_limit: Knots,
}

/// Tracks whitelisted delegates, their pooled promises, and per-depositor
/// contributions.
pub struct DelegationLedger {
    records: HashMap<AccountId, DelegateRecord>,
    contributions: HashMap<(AccountId, AccountId), Knots>,
}

impl DelegationLedger {
    /// Create an empty delegation ledger.
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            contributions: HashMap::new(),
        }
    }

    /// The delegate's record, if whitelisted.
    pub fn record(&self, delegate: &AccountId) -> Option<DelegateRecord> {
        self.records.get(delegate).copied()
    }

    /// Whether `delegate` has been whitelisted.
    pub fn is_whitelisted(&self, delegate: &AccountId) -> bool {
        self.records.contains_key(delegate)
    }

    /// Amount `depositor` has contributed to `delegate`, in knots.
    pub fn contribution(&self, depositor: &AccountId, delegate: &AccountId) -> Knots {
        self.contributions
            .get(&(*depositor, *delegate))
            .copied()
            .unwrap_or(0)
    }

    /// Whitelist `delegate` for pooled deposits. Authorized callers only;
    /// the delegate must already hold an active, unexpired lock.
    pub fn whitelist_delegate(
        &mut self,
        auth: &dyn Authorizer,
        caller: &AccountId,
        escrow: &VoteEscrow,
        delegate: &AccountId,
        early_withdraw_limit: Knots,
        now: Timestamp,
    ) -> Result<(), MooringError> {
        if !auth.is_authorized(caller) {
            return Err(MooringError::Unauthorized(
                "caller may not whitelist delegates".to_string(),
            ));
        }
        if self.records.contains_key(delegate) {
            return Err(MooringError::InvalidState(
                "delegate is already whitelisted".to_string(),
            ));
        }
        let lock = escrow
            .lock(delegate)
            .ok_or_else(|| MooringError::InvalidState("delegate holds no active lock".to_string()))?;
        if lock.expired(now) {
            return Err(MooringError::InvalidState(
                "delegate lock has expired".to_string(),
            ));
        }
        self.records.insert(
            *delegate,
            DelegateRecord {
                delegated_amount: 0,
                not_injected_amount: 0,
                lock_end: lock.end,
                early_withdraw_limit,
            },
        );
        debug!(early_withdraw_limit, "whitelisted delegate");
        Ok(())
    }

    /// Contribute `amount` knots to `delegate`'s pooled position.
    ///
    /// The base token moves into escrow custody now; the delegate's lock is
    /// topped up later via `inject_to_delegator`.
    pub fn deposit_to_delegate(
        &mut self,
        escrow: &mut VoteEscrow,
        token: &mut dyn TokenLedger,
        depositor: &AccountId,
        delegate: &AccountId,
        amount: Knots,
        now: Timestamp,
    ) -> Result<(), MooringError> {
        if amount == 0 {
            return Err(MooringError::InvalidInput(
                "deposit amount must be positive".to_string(),
            ));
        }
        if !self.records.contains_key(delegate) {
            return Err(MooringError::InvalidState(
                "delegate is not whitelisted".to_string(),
            ));
        }
        let lock = escrow
            .lock(delegate)
            .ok_or_else(|| MooringError::InvalidState("delegate holds no active lock".to_string()))?;
        if lock.expired(now) {
            return Err(MooringError::InvalidState(
                "delegate lock has expired".to_string(),
            ));
        }
        token.transfer_from(depositor, &escrow.custody(), amount)?;
        // contains_key checked above
        if let Some(record) = self.records.get_mut(delegate) {
            record.delegated_amount += amount;
            record.not_injected_amount += amount;
            record.lock_end = lock.end;
        }
        let entry = self.contributions.entry((*depositor, *delegate)).or_insert(0);
        *entry += amount;
        escrow.add_pending_settlement(delegate, amount);
        debug!(amount, "deposit to delegate");
        Ok(())
    }

    /// Settle up to `amount` knots of pending contributions into the
    /// delegate's backing lock. Authorized callers only; bounded by the
    /// uninjected amount. No token transfer happens here — custody already
    /// holds the funds from the deposit step.
    pub fn inject_to_delegator(
        &mut self,
        auth: &dyn Authorizer,
        caller: &AccountId,
        escrow: &mut VoteEscrow,
        delegate: &AccountId,
        amount: Knots,
        now: Timestamp,
    ) -> Result<(), MooringError> {
        if !auth.is_authorized(caller) {
            return Err(MooringError::Unauthorized(
                "caller may not inject to delegators".to_string(),
            ));
        }
        let record = self
            .records
            .get(delegate)
            .copied()
            .ok_or_else(|| MooringError::NotFound("delegate is not whitelisted".to_string()))?;
        if amount == 0 || amount > record.not_injected_amount {
            return Err(MooringError::InvalidInput(format!(
                "injection {} outside pending amount {}",
                amount, record.not_injected_amount
            )));
        }
        escrow.credit_locked_amount(delegate, amount, now)?;
        if let Some(record) = self.records.get_mut(delegate) {
            record.not_injected_amount -= amount;
        }
        escrow.reduce_pending_settlement(delegate, amount);
        debug!(amount, "injected to delegator");
        Ok(())
    }

    /// Withdraw the delegate's expired lock. Fails with a settlement-timing
    /// error while any contribution is still uninjected; retryable once
    /// settled.
    pub fn withdraw_delegate(
        &mut self,
        escrow: &mut VoteEscrow,
        token: &mut dyn TokenLedger,
        delegate: &AccountId,
        now: Timestamp,
    ) -> Result<Knots, MooringError> {
        self.require_settled(delegate)?;
        let returned = escrow.withdraw(token, delegate, now)?;
        if let Some(record) = self.records.get_mut(delegate) {
            record.delegated_amount = 0;
        }
        self.contributions.retain(|(_, d), _| d != delegate);
        Ok(returned)
    }

    /// Early-withdraw `amount` knots from the delegate's live lock, subject
    /// to the delegate's early-withdraw limit and full settlement.
    pub fn early_withdraw_delegate(
        &mut self,
        escrow: &mut VoteEscrow,
        token: &mut dyn TokenLedger,
        delegate: &AccountId,
        amount: Knots,
        now: Timestamp,
    ) -> Result<WithdrawOutcome, MooringError> {
        self.require_settled(delegate)?;
        let record = self
            .records
            .get(delegate)
            .copied()
            .ok_or_else(|| MooringError::NotFound("delegate is not whitelisted".to_string()))?;
        if amount > record.early_withdraw_limit {
            return Err(MooringError::InvalidState(format!(
                "amount {} exceeds the early-withdraw limit {}",
                Mor(amount),
                Mor(record.early_withdraw_limit)
            )));
        }
        let outcome = escrow.early_withdraw_partial(token, delegate, amount, now)?;
        if let Some(record) = self.records.get_mut(delegate) {
            record.delegated_amount = record.delegated_amount.saturating_sub(amount);
        }
        self.reduce_contributions(delegate, record.delegated_amount, amount);
        Ok(outcome)
    }

    /// Credit a converted proxy position as a pending (uninjected)
    /// contribution to `delegate`.
    pub(crate) fn credit_pending(
        &mut self,
        escrow: &mut VoteEscrow,
        depositor: &AccountId,
        delegate: &AccountId,
        amount: Knots,
    ) -> Result<(), MooringError> {
        let record = self
            .records
            .get_mut(delegate)
            .ok_or_else(|| MooringError::InvalidState("delegate is not whitelisted".to_string()))?;
        record.delegated_amount += amount;
        record.not_injected_amount += amount;
        let entry = self.contributions.entry((*depositor, *delegate)).or_insert(0);
        *entry += amount;
        escrow.add_pending_settlement(delegate, amount);
        Ok(())
    }

    fn require_settled(&self, delegate: &AccountId) -> Result<(), MooringError> {
        match self.records.get(delegate) {
            Some(record) if record.not_injected_amount > 0 => {
                Err(MooringError::SettlementPending(format!(
                    "{} of contributions are not yet injected",
                    Mor(record.not_injected_amount)
                )))
            }
            _ => Ok(()),
        }
    }

    /// Shrink the delegate's per-depositor contributions pro rata after a
    /// partial early withdrawal of `amount` against a pool of `before`
    /// knots. Truncation dust stays attributed to the depositors.
    fn reduce_contributions(&mut self, delegate: &AccountId, before: Knots, amount: Knots) {
        if before == 0 {
            return;
        }
        if amount >= before {
            self.contributions.retain(|(_, d), _| d != delegate);
            return;
        }
        self.contributions.retain(|(_, d), contributed| {
            if d == delegate {
                let cut = (*contributed as u128 * amount as u128 / before as u128) as u64;
                *contributed -= cut;
                *contributed > 0
            } else {
                true
            }
        });
    }
}

impl Default for DelegationLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::penalty::PenaltyConfig;
    use mooring_core::{week_floor, AllowList, InMemoryToken, KNOTS_PER_MOR, WEEK};

    const T0: Timestamp = 2_600 * WEEK + 1_234;

    fn acct(b: u8) -> AccountId {
        [b; 32]
    }

    fn setup() -> (VoteEscrow, DelegationLedger, InMemoryToken, AllowList) {
        let mut escrow = VoteEscrow::new(
            acct(250),
            acct(251),
            acct(252),
            PenaltyConfig::default(),
            T0,
        );
        let mut token = InMemoryToken::new();
        for b in 1..=10 {
            token.mint(&acct(b), 1_000_000 * KNOTS_PER_MOR);
        }
        // acct(5) is the delegate and holds the backing lock
        escrow
            .create_lock(
                &mut token,
                &acct(5),
                1_000 * KNOTS_PER_MOR,
                T0 + 20 * WEEK,
                T0,
            )
            .unwrap();
        let auth = AllowList::new([acct(9)]);
        (escrow, DelegationLedger::new(), token, auth)
    }

    #[test]
    fn test_whitelist_requires_authorization() {
        let (escrow, mut delegation, _, auth) = setup();
        let result =
            delegation.whitelist_delegate(&auth, &acct(1), &escrow, &acct(5), 0, T0);
        assert!(matches!(result, Err(MooringError::Unauthorized(_))));
    }

    #[test]
    fn test_whitelist_requires_active_lock() {
        let (escrow, mut delegation, _, auth) = setup();
        // acct(6) holds no lock
        let result =
            delegation.whitelist_delegate(&auth, &acct(9), &escrow, &acct(6), 0, T0);
        assert!(matches!(result, Err(MooringError::InvalidState(_))));
    }

    #[test]
    fn test_deposit_requires_whitelisting() {
        let (mut escrow, mut delegation, mut token, _) = setup();
        let result = delegation.deposit_to_delegate(
            &mut escrow,
            &mut token,
            &acct(1),
            &acct(5),
            100 * KNOTS_PER_MOR,
            T0,
        );
        assert!(matches!(result, Err(MooringError::InvalidState(_))));
    }

    #[test]
    fn test_deposit_credits_promise() {
        let (mut escrow, mut delegation, mut token, auth) = setup();
        delegation
            .whitelist_delegate(&auth, &acct(9), &escrow, &acct(5), 0, T0)
            .unwrap();
        delegation
            .deposit_to_delegate(
                &mut escrow,
                &mut token,
                &acct(1),
                &acct(5),
                100 * KNOTS_PER_MOR,
                T0,
            )
            .unwrap();
        let record = delegation.record(&acct(5)).unwrap();
        assert_eq!(record.delegated_amount, 100 * KNOTS_PER_MOR);
        assert_eq!(record.not_injected_amount, 100 * KNOTS_PER_MOR);
        assert_eq!(record.lock_end, week_floor(T0 + 20 * WEEK));
        assert_eq!(
            delegation.contribution(&acct(1), &acct(5)),
            100 * KNOTS_PER_MOR
        );
        // Deposit moves tokens into custody but does not grow the lock yet.
        assert_eq!(
            escrow.lock(&acct(5)).unwrap().amount,
            1_000 * KNOTS_PER_MOR
        );
    }

    #[test]
    fn test_injection_bounded_by_pending() {
        let (mut escrow, mut delegation, mut token, auth) = setup();
        delegation
            .whitelist_delegate(&auth, &acct(9), &escrow, &acct(5), 0, T0)
            .unwrap();
        delegation
            .deposit_to_delegate(
                &mut escrow,
                &mut token,
                &acct(1),
                &acct(5),
                100 * KNOTS_PER_MOR,
                T0,
            )
            .unwrap();
        let result = delegation.inject_to_delegator(
            &auth,
            &acct(9),
            &mut escrow,
            &acct(5),
            101 * KNOTS_PER_MOR,
            T0,
        );
        assert!(matches!(result, Err(MooringError::InvalidInput(_))));
    }

    #[test]
    fn test_injection_grows_lock_and_settles() {
        let (mut escrow, mut delegation, mut token, auth) = setup();
        delegation
            .whitelist_delegate(&auth, &acct(9), &escrow, &acct(5), 0, T0)
            .unwrap();
        delegation
            .deposit_to_delegate(
                &mut escrow,
                &mut token,
                &acct(1),
                &acct(5),
                100 * KNOTS_PER_MOR,
                T0,
            )
            .unwrap();
        delegation
            .inject_to_delegator(
                &auth,
                &acct(9),
                &mut escrow,
                &acct(5),
                60 * KNOTS_PER_MOR,
                T0 + 1,
            )
            .unwrap();
        assert_eq!(
            escrow.lock(&acct(5)).unwrap().amount,
            1_060 * KNOTS_PER_MOR
        );
        let record = delegation.record(&acct(5)).unwrap();
        assert_eq!(record.not_injected_amount, 40 * KNOTS_PER_MOR);
        assert_eq!(record.delegated_amount, 100 * KNOTS_PER_MOR);
    }

    #[test]
    fn test_withdraw_blocked_until_injected() {
        let (mut escrow, mut delegation, mut token, auth) = setup();
        delegation
            .whitelist_delegate(&auth, &acct(9), &escrow, &acct(5), 0, T0)
            .unwrap();
        delegation
            .deposit_to_delegate(
                &mut escrow,
                &mut token,
                &acct(1),
                &acct(5),
                100 * KNOTS_PER_MOR,
                T0,
            )
            .unwrap();
        let after_end = T0 + 21 * WEEK;
        let result = delegation.withdraw_delegate(&mut escrow, &mut token, &acct(5), after_end);
        assert!(matches!(result, Err(MooringError::SettlementPending(_))));

        // Settle, then the same withdrawal goes through.
        delegation
            .inject_to_delegator(
                &auth,
                &acct(9),
                &mut escrow,
                &acct(5),
                100 * KNOTS_PER_MOR,
                T0 + 1,
            )
            .unwrap();
        let returned = delegation
            .withdraw_delegate(&mut escrow, &mut token, &acct(5), after_end)
            .unwrap();
        assert_eq!(returned, 1_100 * KNOTS_PER_MOR);
        assert_eq!(delegation.record(&acct(5)).unwrap().delegated_amount, 0);
        // A full withdrawal clears the depositor contribution records too.
        assert_eq!(delegation.contribution(&acct(1), &acct(5)), 0);
    }

    #[test]
    fn test_direct_escrow_withdraw_blocked_until_injected() {
        let (mut escrow, mut delegation, mut token, auth) = setup();
        delegation
            .whitelist_delegate(&auth, &acct(9), &escrow, &acct(5), 0, T0)
            .unwrap();
        delegation
            .deposit_to_delegate(
                &mut escrow,
                &mut token,
                &acct(1),
                &acct(5),
                100 * KNOTS_PER_MOR,
                T0,
            )
            .unwrap();
        assert_eq!(escrow.pending_settlement(&acct(5)), 100 * KNOTS_PER_MOR);

        // Going to the escrow directly does not dodge the settlement gate.
        assert!(matches!(
            escrow.early_withdraw(&mut token, &acct(5), T0 + WEEK),
            Err(MooringError::SettlementPending(_))
        ));
        assert!(matches!(
            escrow.withdraw(&mut token, &acct(5), T0 + 21 * WEEK),
            Err(MooringError::SettlementPending(_))
        ));

        delegation
            .inject_to_delegator(
                &auth,
                &acct(9),
                &mut escrow,
                &acct(5),
                100 * KNOTS_PER_MOR,
                T0 + WEEK,
            )
            .unwrap();
        assert_eq!(escrow.pending_settlement(&acct(5)), 0);
        escrow
            .early_withdraw(&mut token, &acct(5), T0 + 2 * WEEK)
            .unwrap();
    }

    #[test]
    fn test_early_withdraw_reduces_contributions() {
        let (mut escrow, mut delegation, mut token, auth) = setup();
        delegation
            .whitelist_delegate(
                &auth,
                &acct(9),
                &escrow,
                &acct(5),
                100 * KNOTS_PER_MOR,
                T0,
            )
            .unwrap();
        for (depositor, amount) in [(acct(1), 60u64), (acct(2), 40)] {
            delegation
                .deposit_to_delegate(
                    &mut escrow,
                    &mut token,
                    &depositor,
                    &acct(5),
                    amount * KNOTS_PER_MOR,
                    T0,
                )
                .unwrap();
        }
        delegation
            .inject_to_delegator(
                &auth,
                &acct(9),
                &mut escrow,
                &acct(5),
                100 * KNOTS_PER_MOR,
                T0 + 1,
            )
            .unwrap();
        delegation
            .early_withdraw_delegate(
                &mut escrow,
                &mut token,
                &acct(5),
                50 * KNOTS_PER_MOR,
                T0 + WEEK,
            )
            .unwrap();

        // Half the pool left, so each contribution shrinks by half.
        let record = delegation.record(&acct(5)).unwrap();
        assert_eq!(record.delegated_amount, 50 * KNOTS_PER_MOR);
        assert_eq!(delegation.contribution(&acct(1), &acct(5)), 30 * KNOTS_PER_MOR);
        assert_eq!(delegation.contribution(&acct(2), &acct(5)), 20 * KNOTS_PER_MOR);
    }

    #[test]
    fn test_early_withdraw_limit_enforced() {
        let (mut escrow, mut delegation, mut token, auth) = setup();
        delegation
            .whitelist_delegate(
                &auth,
                &acct(9),
                &escrow,
                &acct(5),
                50 * KNOTS_PER_MOR,
                T0,
            )
            .unwrap();
        let result = delegation.early_withdraw_delegate(
            &mut escrow,
            &mut token,
            &acct(5),
            51 * KNOTS_PER_MOR,
            T0 + WEEK,
        );
        assert!(matches!(result, Err(MooringError::InvalidState(_))));

        let outcome = delegation
            .early_withdraw_delegate(
                &mut escrow,
                &mut token,
                &acct(5),
                50 * KNOTS_PER_MOR,
                T0 + WEEK,
            )
            .unwrap();
        assert!(outcome.penalty > 0);
        assert_eq!(
            escrow.lock(&acct(5)).unwrap().amount,
            950 * KNOTS_PER_MOR
        );
    }
}
