// crates/mooring-escrow/src/proxy.rs
//
// Proxy registry: 1:1 stand-in identities for migrated legacy positions.
//
// Migration reads (amount, end, boosted share) once from the legacy source
// and seeds a lock under a derived proxy identity with the original terms,
// leaving the escrow decay math untouched. Claim-time resolution maps the
// proxy back to its owning account. Within a bounded window after migration
// the owner may instead convert the position into a delegated one.

use std::collections::HashMap;

use tracing::debug;

use mooring_core::{
    derive_proxy_id, AccountId, Knots, LegacyPositionSource, MooringError, Timestamp,
};

use crate::delegation::DelegationLedger;
use crate::escrow::VoteEscrow;

/// Default conversion window after migration: 14 days.
pub const DEFAULT_CONVERT_WINDOW: i64 = 14 * 24 * 3600;

/// Tracks proxy <-> owner mappings for migrated legacy positions.
pub struct ProxyRegistry {
    proxy_of: HashMap<AccountId, AccountId>,
    owner_of: HashMap<AccountId, AccountId>,
    migrated_at: HashMap<AccountId, Timestamp>,
    convert_window: i64,
}

impl ProxyRegistry {
    /// Create an empty registry with the given conversion window (seconds).
    pub fn new(convert_window: i64) -> Self {
        Self {
            proxy_of: HashMap::new(),
            owner_of: HashMap::new(),
            migrated_at: HashMap::new(),
            convert_window,
        }
    }

    /// The owning account of `proxy`, if it is a migrated stand-in.
    pub fn resolve_owner(&self, proxy: &AccountId) -> Option<AccountId> {
        self.owner_of.get(proxy).copied()
    }

    /// The proxy identity holding `owner`'s migrated position, if any.
    pub fn proxy_for(&self, owner: &AccountId) -> Option<AccountId> {
        self.proxy_of.get(owner).copied()
    }

    /// When `owner` migrated, if ever.
    pub fn migrated_at(&self, owner: &AccountId) -> Option<Timestamp> {
        self.migrated_at.get(owner).copied()
    }

    /// Migrate `owner`'s legacy position into a proxy lock with the
    /// original amount and end. One migration per owner; custody of the
    /// legacy funds stays with the legacy source.
    ///
    /// Returns the derived proxy identity.
    pub fn migrate(
        &mut self,
        escrow: &mut VoteEscrow,
        source: &dyn LegacyPositionSource,
        owner: &AccountId,
        now: Timestamp,
    ) -> Result<AccountId, MooringError> {
        if self.proxy_of.contains_key(owner) {
            return Err(MooringError::InvalidState(
                "account has already migrated".to_string(),
            ));
        }
        let position = source
            .position_of(owner)
            .ok_or_else(|| MooringError::NotFound("no legacy position to migrate".to_string()))?;
        if position.amount == 0 {
            return Err(MooringError::InvalidInput(
                "legacy position holds no value".to_string(),
            ));
        }
        let proxy = derive_proxy_id(owner);
        escrow.seed_lock(&proxy, position.amount, position.end, now)?;
        self.proxy_of.insert(*owner, proxy);
        self.owner_of.insert(proxy, *owner);
        self.migrated_at.insert(*owner, now);
        debug!(amount = position.amount, end = position.end, "migrated legacy position");
        Ok(proxy)
    }

    /// Convert `owner`'s migrated position into a pending contribution to
    /// `delegate`. Only valid within the conversion window from migration
    /// and while the proxy's lock is unexpired. Cancels the proxy lock
    /// (including its scheduled slope change) and removes the mapping.
    ///
    /// Returns the converted amount.
    pub fn convert_to_delegate(
        &mut self,
        escrow: &mut VoteEscrow,
        delegation: &mut DelegationLedger,
        owner: &AccountId,
        delegate: &AccountId,
        now: Timestamp,
    ) -> Result<Knots, MooringError> {
        let proxy = self
            .proxy_of
            .get(owner)
            .copied()
            .ok_or_else(|| MooringError::NotFound("no migrated position".to_string()))?;
        let migrated = self.migrated_at.get(owner).copied().ok_or_else(|| {
            MooringError::Invariant("migrated proxy without a migration timestamp".to_string())
        })?;
        if now > migrated + self.convert_window {
            return Err(MooringError::InvalidState(
                "conversion window has closed".to_string(),
            ));
        }
        match escrow.lock(&proxy) {
            Some(lock) if !lock.expired(now) => {}
            _ => {
                return Err(MooringError::InvalidState(
                    "original lock has expired".to_string(),
                ))
            }
        }
        if !delegation.is_whitelisted(delegate) {
            return Err(MooringError::InvalidState(
                "delegate is not whitelisted".to_string(),
            ));
        }
        let amount = escrow.cancel_lock(&proxy, now)?;
        delegation.credit_pending(escrow, owner, delegate, amount)?;
        self.proxy_of.remove(owner);
        self.owner_of.remove(&proxy);
        debug!(amount, "converted migrated position to delegate");
        Ok(amount)
    }
}

impl Default for ProxyRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CONVERT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::penalty::PenaltyConfig;
    use mooring_core::{
        week_floor, AllowList, InMemoryLegacy, InMemoryToken, LegacyPosition, KNOTS_PER_MOR, WEEK,
    };

    const T0: Timestamp = 2_600 * WEEK + 1_234;

    fn acct(b: u8) -> AccountId {
        [b; 32]
    }

    fn setup() -> (VoteEscrow, ProxyRegistry, InMemoryLegacy) {
        let escrow = VoteEscrow::new(
            acct(250),
            acct(251),
            acct(252),
            PenaltyConfig::default(),
            T0,
        );
        let mut legacy = InMemoryLegacy::new();
        legacy.insert(
            acct(1),
            LegacyPosition {
                amount: 500 * KNOTS_PER_MOR,
                end: week_floor(T0 + 26 * WEEK),
                boosted_share: 40 * KNOTS_PER_MOR,
            },
        );
        (escrow, ProxyRegistry::default(), legacy)
    }

    #[test]
    fn test_migration_seeds_proxy_lock() {
        let (mut escrow, mut proxies, legacy) = setup();
        let proxy = proxies.migrate(&mut escrow, &legacy, &acct(1), T0).unwrap();
        let lock = escrow.lock(&proxy).unwrap();
        assert_eq!(lock.amount, 500 * KNOTS_PER_MOR);
        assert_eq!(lock.end, week_floor(T0 + 26 * WEEK));
        assert_eq!(proxies.resolve_owner(&proxy), Some(acct(1)));
        assert_eq!(proxies.proxy_for(&acct(1)), Some(proxy));
    }

    #[test]
    fn test_migration_equivalence() {
        // A proxy seeded from a legacy position must decay identically to a
        // fresh lock with the same amount and end.
        let (mut escrow, mut proxies, legacy) = setup();
        let mut token = InMemoryToken::new();
        token.mint(&acct(2), 1_000 * KNOTS_PER_MOR);

        let end = week_floor(T0 + 26 * WEEK);
        let proxy = proxies.migrate(&mut escrow, &legacy, &acct(1), T0).unwrap();
        escrow
            .create_lock(&mut token, &acct(2), 500 * KNOTS_PER_MOR, end, T0)
            .unwrap();

        for i in 0..30 {
            let t = T0 + i * WEEK;
            assert_eq!(
                escrow.balance_of_at(&proxy, t),
                escrow.balance_of_at(&acct(2), t),
                "curves diverge at t={}",
                t
            );
        }
    }

    #[test]
    fn test_double_migration_rejected() {
        let (mut escrow, mut proxies, legacy) = setup();
        proxies.migrate(&mut escrow, &legacy, &acct(1), T0).unwrap();
        let result = proxies.migrate(&mut escrow, &legacy, &acct(1), T0 + 1);
        assert!(matches!(result, Err(MooringError::InvalidState(_))));
    }

    #[test]
    fn test_migration_requires_legacy_position() {
        let (mut escrow, mut proxies, legacy) = setup();
        let result = proxies.migrate(&mut escrow, &legacy, &acct(3), T0);
        assert!(matches!(result, Err(MooringError::NotFound(_))));
    }

    fn setup_with_delegate() -> (
        VoteEscrow,
        ProxyRegistry,
        InMemoryLegacy,
        DelegationLedger,
        InMemoryToken,
    ) {
        let (mut escrow, proxies, legacy) = setup();
        let mut token = InMemoryToken::new();
        token.mint(&acct(5), 10_000 * KNOTS_PER_MOR);
        escrow
            .create_lock(
                &mut token,
                &acct(5),
                1_000 * KNOTS_PER_MOR,
                T0 + 30 * WEEK,
                T0,
            )
            .unwrap();
        let mut delegation = DelegationLedger::new();
        let auth = AllowList::new([acct(9)]);
        delegation
            .whitelist_delegate(&auth, &acct(9), &escrow, &acct(5), 0, T0)
            .unwrap();
        (escrow, proxies, legacy, delegation, token)
    }

    #[test]
    fn test_convert_within_window() {
        let (mut escrow, mut proxies, legacy, mut delegation, _) = setup_with_delegate();
        let proxy = proxies.migrate(&mut escrow, &legacy, &acct(1), T0).unwrap();
        let amount = proxies
            .convert_to_delegate(&mut escrow, &mut delegation, &acct(1), &acct(5), T0 + 24 * 3600)
            .unwrap();
        assert_eq!(amount, 500 * KNOTS_PER_MOR);
        let record = delegation.record(&acct(5)).unwrap();
        assert_eq!(record.not_injected_amount, 500 * KNOTS_PER_MOR);
        // The proxy position no longer exists anywhere.
        assert!(escrow.lock(&proxy).is_none());
        assert!(proxies.resolve_owner(&proxy).is_none());
        assert_eq!(escrow.balance_of(&proxy, T0 + 2 * 24 * 3600), 0);
    }

    #[test]
    fn test_convert_after_window_fails() {
        let (mut escrow, mut proxies, legacy, mut delegation, _) = setup_with_delegate();
        proxies.migrate(&mut escrow, &legacy, &acct(1), T0).unwrap();
        let late = T0 + DEFAULT_CONVERT_WINDOW + 1;
        let result =
            proxies.convert_to_delegate(&mut escrow, &mut delegation, &acct(1), &acct(5), late);
        assert!(matches!(result, Err(MooringError::InvalidState(_))));
    }

    #[test]
    fn test_convert_keeps_total_supply_consistent() {
        let (mut escrow, mut proxies, legacy, mut delegation, _) = setup_with_delegate();
        proxies.migrate(&mut escrow, &legacy, &acct(1), T0).unwrap();
        proxies
            .convert_to_delegate(&mut escrow, &mut delegation, &acct(1), &acct(5), T0 + 3600)
            .unwrap();
        // Cancelling the proxy must have removed its scheduled slope change:
        // only the delegate's balance remains in the total from here on.
        for i in 1..30 {
            let t = T0 + i * WEEK;
            assert_eq!(
                escrow.total_supply_at(t),
                escrow.balance_of_at(&acct(5), t),
                "total-supply drift at t={}",
                t
            );
        }
    }
}
