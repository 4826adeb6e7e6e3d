// crates/mooring-escrow/src/escrow.rs
//
// The vote-escrow lock ledger.
//
// Accounts lock $MOR until a week-aligned future time and receive a derived
// balance that decays linearly to zero at the lock end:
//
//   slope = amount / (end - now)
//   bias  = slope * (end - now)        (so decay hits exactly zero at end)
//
// Every mutation appends a checkpoint to the account's history and to the
// global history, and maintains a slope-change schedule keyed by week
// boundary so total supply can be reconstructed at any past time by a
// bounded week-by-week walk instead of a per-account rescan. Total bias and
// slope are the sums of independent per-account contributions, which is what
// makes the global accounting purely additive.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use mooring_core::{
    week_floor, AccountId, Authorizer, Knots, Mor, MooringError, Timestamp, TokenLedger,
    MAX_LOCK_DURATION, WEEK,
};

use crate::penalty::{compute_penalty, PenaltyConfig, BPS_DENOMINATOR};
use crate::point::{last_point_at, Point};

/// Maximum week boundaries walked per global catch-up call. After a longer
/// idle gap, callers must invoke `checkpoint` repeatedly to fully catch up.
pub const MAX_CATCHUP_WEEKS: usize = 255;

/// A single account's lock: amount committed until `end`.
///
/// `end` is always rounded down to a week boundary. A zero amount means no
/// active lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    /// Locked amount in knots.
    pub amount: Knots,
    /// Unlock timestamp (week-aligned). Zero when no active lock.
    pub end: Timestamp,
}

impl Lock {
    /// Whether this lock holds any value.
    pub fn is_active(&self) -> bool {
        self.amount > 0
    }

    /// Whether the lock has reached its end.
    pub fn expired(&self, now: Timestamp) -> bool {
        self.end <= now
    }
}

/// Outcome of an early or emergency withdrawal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WithdrawOutcome {
    /// Amount returned to the account, in knots.
    pub returned: Knots,
    /// Penalty collected, in knots (split treasury/redistribution).
    pub penalty: Knots,
}

/// The vote-escrow lock ledger.
pub struct VoteEscrow {
    /// Account holding locked base tokens.
    custody: AccountId,
    /// Destination for the treasury share of early-withdraw penalties.
    treasury: AccountId,
    /// Destination for the redistribution share of early-withdraw penalties.
    redistribution: AccountId,
    config: PenaltyConfig,
    /// Admin toggle: when set, emergency withdrawals bypass the penalty.
    emergency_unlocked: bool,
    penalty_exempt: HashSet<AccountId>,
    /// Uninjected delegation credit per account. Any nonzero entry blocks
    /// that account's withdrawals until injection completes.
    pending_settlement: HashMap<AccountId, Knots>,
    locks: HashMap<AccountId, Lock>,
    user_point_history: HashMap<AccountId, Vec<Point>>,
    point_history: Vec<Point>,
    /// Signed delta applied to the global slope when each week boundary
    /// arrives. Lock contributions enter as negative deltas at their end.
    slope_changes: BTreeMap<Timestamp, i128>,
}

impl VoteEscrow {
    /// Create an empty escrow ledger.
    ///
    /// `custody` receives locked base tokens; `treasury` and `redistribution`
    /// receive the two halves of early-withdraw penalties.
    pub fn new(
        custody: AccountId,
        treasury: AccountId,
        redistribution: AccountId,
        config: PenaltyConfig,
        now: Timestamp,
    ) -> Self {
        Self {
            custody,
            treasury,
            redistribution,
            config,
            emergency_unlocked: false,
            penalty_exempt: HashSet::new(),
            pending_settlement: HashMap::new(),
            locks: HashMap::new(),
            user_point_history: HashMap::new(),
            point_history: vec![Point::zero(now)],
            slope_changes: BTreeMap::new(),
        }
    }

    // ---- queries ----------------------------------------------------------

    /// The account's current lock, if any.
    pub fn lock(&self, account: &AccountId) -> Option<Lock> {
        self.locks.get(account).copied().filter(|l| l.is_active())
    }

    /// The account's checkpoint history (may be empty).
    pub fn user_history(&self, account: &AccountId) -> &[Point] {
        self.user_point_history
            .get(account)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The global checkpoint history.
    pub fn global_history(&self) -> &[Point] {
        &self.point_history
    }

    /// The scheduled slope delta at a week boundary (zero if none).
    pub fn slope_change_at(&self, t: Timestamp) -> i128 {
        self.slope_changes.get(&t).copied().unwrap_or(0)
    }

    /// Timestamp of the account's first checkpoint, if it has any history.
    pub fn first_user_point_ts(&self, account: &AccountId) -> Option<Timestamp> {
        self.user_point_history
            .get(account)
            .and_then(|h| h.first())
            .map(|p| p.ts)
    }

    /// Custody account holding locked base tokens.
    pub fn custody(&self) -> AccountId {
        self.custody
    }

    /// Treasury account receiving the treasury share of penalties.
    pub fn treasury_account(&self) -> AccountId {
        self.treasury
    }

    /// Redistribution account receiving the remaining penalty share.
    pub fn redistribution_account(&self) -> AccountId {
        self.redistribution
    }

    /// Current penalty configuration.
    pub fn penalty_config(&self) -> PenaltyConfig {
        self.config
    }

    /// Uninjected delegation credit pending against the account's lock.
    pub fn pending_settlement(&self, account: &AccountId) -> Knots {
        self.pending_settlement.get(account).copied().unwrap_or(0)
    }

    /// Decayed balance of `account` at time `t`.
    ///
    /// Binary-searches the account's history for the last checkpoint at or
    /// before `t` and applies the decay formula, floored at zero.
    pub fn balance_of_at(&self, account: &AccountId, t: Timestamp) -> Knots {
        match last_point_at(self.user_history(account), t) {
            Some(p) => p.eval(t),
            None => 0,
        }
    }

    /// Decayed balance of `account` right now.
    pub fn balance_of(&self, account: &AccountId, now: Timestamp) -> Knots {
        self.balance_of_at(account, now)
    }

    /// Total supply of decayed balances at time `t`.
    ///
    /// Starts from the last global checkpoint at or before `t` and walks
    /// forward one week at a time applying scheduled slope deltas. The walk
    /// is bounded by elapsed weeks, not account count.
    pub fn total_supply_at(&self, t: Timestamp) -> Knots {
        let Some(mut pt) = last_point_at(&self.point_history, t) else {
            return 0;
        };
        let mut t_i = week_floor(pt.ts);
        for _ in 0..MAX_CATCHUP_WEEKS {
            t_i += WEEK;
            let mut d_slope = 0i128;
            if t_i > t {
                t_i = t;
            } else {
                d_slope = self.slope_changes.get(&t_i).copied().unwrap_or(0);
            }
            pt.bias -= pt.slope * (t_i - pt.ts) as i128;
            if pt.bias < 0 {
                pt.bias = 0;
            }
            pt.slope += d_slope;
            if pt.slope < 0 {
                pt.slope = 0;
            }
            pt.ts = t_i;
            if t_i == t {
                break;
            }
        }
        if pt.bias < 0 {
            0
        } else {
            pt.bias as u64
        }
    }

    /// Total supply of decayed balances right now.
    pub fn total_supply(&self, now: Timestamp) -> Knots {
        self.total_supply_at(now)
    }

    // ---- lock operations --------------------------------------------------

    /// Lock `amount` knots for `account` until `unlock_time` (rounded down
    /// to a week boundary). Debits the base token into escrow custody.
    ///
    /// # Errors
    /// Rejects a zero amount, an unlock time that rounds to zero weeks, an
    /// unlock time beyond the 4-year horizon, or an already-active lock.
    pub fn create_lock(
        &mut self,
        token: &mut dyn TokenLedger,
        account: &AccountId,
        amount: Knots,
        unlock_time: Timestamp,
        now: Timestamp,
    ) -> Result<(), MooringError> {
        let unlock = self.validate_new_lock(account, amount, unlock_time, now)?;
        token.transfer_from(account, &self.custody, amount)?;
        self.apply_created_lock(account, amount, unlock, now)
    }

    /// Add `amount` knots to an active, unexpired lock. Bias and slope are
    /// recomputed from the new (amount, end) pair.
    pub fn increase_lock_amount(
        &mut self,
        token: &mut dyn TokenLedger,
        account: &AccountId,
        amount: Knots,
        now: Timestamp,
    ) -> Result<(), MooringError> {
        if amount == 0 {
            return Err(MooringError::InvalidInput(
                "increase amount must be positive".to_string(),
            ));
        }
        let old = self.active_unexpired_lock(account, now)?;
        token.transfer_from(account, &self.custody, amount)?;
        let new = Lock {
            amount: old.amount + amount,
            end: old.end,
        };
        self.locks.insert(*account, new);
        self.checkpoint_user(account, old, new, now)?;
        debug!(amount, total = new.amount, "increased lock amount");
        Ok(())
    }

    /// Extend an active, unexpired lock to `new_end` (rounded down to a week
    /// boundary). The new end must be strictly later than the current end
    /// and within the 4-year horizon.
    pub fn increase_unlock_time(
        &mut self,
        account: &AccountId,
        new_end: Timestamp,
        now: Timestamp,
    ) -> Result<(), MooringError> {
        let old = self.active_unexpired_lock(account, now)?;
        let unlock = week_floor(new_end);
        if unlock <= old.end {
            return Err(MooringError::InvalidInput(format!(
                "new unlock time {} does not extend current end {}",
                unlock, old.end
            )));
        }
        if unlock > now + MAX_LOCK_DURATION {
            return Err(MooringError::InvalidInput(
                "unlock time exceeds the 4-year maximum".to_string(),
            ));
        }
        let new = Lock {
            amount: old.amount,
            end: unlock,
        };
        self.locks.insert(*account, new);
        self.checkpoint_user(account, old, new, now)?;
        debug!(end = unlock, "extended lock");
        Ok(())
    }

    /// Withdraw a lock whose end has passed. The decay already reached zero
    /// naturally, so no slope-schedule adjustment is needed. Fails while
    /// uninjected delegation credit is pending against the account.
    ///
    /// Returns the amount credited back to the account.
    pub fn withdraw(
        &mut self,
        token: &mut dyn TokenLedger,
        account: &AccountId,
        now: Timestamp,
    ) -> Result<Knots, MooringError> {
        let old = self
            .lock(account)
            .ok_or_else(|| MooringError::NotFound("no active lock".to_string()))?;
        if now <= old.end {
            return Err(MooringError::InvalidState(format!(
                "lock does not end until {}",
                old.end
            )));
        }
        self.require_settled(account)?;
        self.locks.insert(*account, Lock::default());
        self.checkpoint_user(account, old, Lock::default(), now)?;
        token.transfer(&self.custody, account, old.amount)?;
        debug!(amount = old.amount, "withdrew expired lock");
        Ok(old.amount)
    }

    /// Withdraw the whole lock before its end, paying the early-exit penalty.
    pub fn early_withdraw(
        &mut self,
        token: &mut dyn TokenLedger,
        account: &AccountId,
        now: Timestamp,
    ) -> Result<WithdrawOutcome, MooringError> {
        let old = self.active_unexpired_lock(account, now)?;
        self.early_withdraw_partial(token, account, old.amount, now)
    }

    /// Withdraw `amount` knots from a live lock before its end.
    ///
    /// The penalty is `bps_per_week * remaining_weeks * amount / 10_000`,
    /// capped at the amount, split between the treasury and redistribution
    /// accounts; exempted accounts pay nothing. Fails while uninjected
    /// delegation credit is pending against the account. Cancels (or
    /// reduces) the still-pending slope-change entry at the lock end —
    /// skipping that step would silently corrupt every future total-supply
    /// query.
    pub fn early_withdraw_partial(
        &mut self,
        token: &mut dyn TokenLedger,
        account: &AccountId,
        amount: Knots,
        now: Timestamp,
    ) -> Result<WithdrawOutcome, MooringError> {
        let old = self.active_unexpired_lock(account, now)?;
        self.require_settled(account)?;
        if amount == 0 || amount > old.amount {
            return Err(MooringError::InvalidInput(format!(
                "withdraw amount {} outside locked amount {}",
                amount, old.amount
            )));
        }
        let remaining_weeks = remaining_whole_weeks(old.end, now);
        let penalty = if self.penalty_exempt.contains(account) {
            0
        } else {
            compute_penalty(amount, remaining_weeks, self.config.bps_per_week)
        };

        let new = if amount == old.amount {
            Lock::default()
        } else {
            Lock {
                amount: old.amount - amount,
                end: old.end,
            }
        };
        self.locks.insert(*account, new);
        self.checkpoint_user(account, old, new, now)?;

        let to_treasury =
            (penalty as u128 * self.config.treasury_share_bps as u128 / BPS_DENOMINATOR as u128) as u64;
        let to_redistribution = penalty - to_treasury;
        if to_treasury > 0 {
            token.transfer(&self.custody, &self.treasury, to_treasury)?;
        }
        if to_redistribution > 0 {
            token.transfer(&self.custody, &self.redistribution, to_redistribution)?;
        }
        let returned = amount - penalty;
        if returned > 0 {
            token.transfer(&self.custody, account, returned)?;
        }
        debug!(amount, penalty, remaining_weeks, "early withdrawal");
        Ok(WithdrawOutcome { returned, penalty })
    }

    /// Withdraw the whole lock before its end with no penalty. Only available
    /// while the admin emergency toggle is set. Cancels the pending
    /// slope-change entry like `early_withdraw`.
    pub fn emergency_withdraw(
        &mut self,
        token: &mut dyn TokenLedger,
        account: &AccountId,
        now: Timestamp,
    ) -> Result<Knots, MooringError> {
        if !self.emergency_unlocked {
            return Err(MooringError::InvalidState(
                "emergency unlock is not enabled".to_string(),
            ));
        }
        let old = self.active_unexpired_lock(account, now)?;
        self.require_settled(account)?;
        self.locks.insert(*account, Lock::default());
        self.checkpoint_user(account, old, Lock::default(), now)?;
        token.transfer(&self.custody, account, old.amount)?;
        debug!(amount = old.amount, "emergency withdrawal");
        Ok(old.amount)
    }

    /// Record a global checkpoint up to `now`, applying scheduled slope
    /// changes at each week boundary. Bounded to `MAX_CATCHUP_WEEKS`
    /// boundaries per call; invoke repeatedly after long idle periods.
    pub fn checkpoint(&mut self, now: Timestamp) {
        self.checkpoint_global(now);
    }

    // ---- admin ------------------------------------------------------------

    /// Toggle penalty-free emergency withdrawals. Authorized callers only.
    pub fn set_emergency_unlock(
        &mut self,
        auth: &dyn Authorizer,
        caller: &AccountId,
        enabled: bool,
    ) -> Result<(), MooringError> {
        self.require_authorized(auth, caller)?;
        self.emergency_unlocked = enabled;
        Ok(())
    }

    /// Replace the penalty configuration. Authorized callers only.
    pub fn set_penalty_config(
        &mut self,
        auth: &dyn Authorizer,
        caller: &AccountId,
        config: PenaltyConfig,
    ) -> Result<(), MooringError> {
        self.require_authorized(auth, caller)?;
        if config.treasury_share_bps > BPS_DENOMINATOR {
            return Err(MooringError::InvalidInput(
                "treasury share exceeds 100%".to_string(),
            ));
        }
        self.config = config;
        Ok(())
    }

    /// Mark or unmark an account as exempt from early-withdraw penalties.
    /// Authorized callers only.
    pub fn set_penalty_exempt(
        &mut self,
        auth: &dyn Authorizer,
        caller: &AccountId,
        account: &AccountId,
        exempt: bool,
    ) -> Result<(), MooringError> {
        self.require_authorized(auth, caller)?;
        if exempt {
            self.penalty_exempt.insert(*account);
        } else {
            self.penalty_exempt.remove(account);
        }
        Ok(())
    }

    // ---- crate-internal lock plumbing -------------------------------------

    /// Create a lock without debiting the base token. Used by proxy
    /// migration, where custody of the legacy funds stays with the legacy
    /// source.
    pub(crate) fn seed_lock(
        &mut self,
        account: &AccountId,
        amount: Knots,
        unlock_time: Timestamp,
        now: Timestamp,
    ) -> Result<(), MooringError> {
        let unlock = self.validate_new_lock(account, amount, unlock_time, now)?;
        self.apply_created_lock(account, amount, unlock, now)
    }

    /// Add already-custodied funds to an active, unexpired lock. Used by
    /// delegate injection: the deposit step moved the tokens into custody,
    /// so no further transfer happens here.
    pub(crate) fn credit_locked_amount(
        &mut self,
        account: &AccountId,
        amount: Knots,
        now: Timestamp,
    ) -> Result<(), MooringError> {
        if amount == 0 {
            return Err(MooringError::InvalidInput(
                "credit amount must be positive".to_string(),
            ));
        }
        let old = self.active_unexpired_lock(account, now)?;
        let new = Lock {
            amount: old.amount + amount,
            end: old.end,
        };
        self.locks.insert(*account, new);
        self.checkpoint_user(account, old, new, now)
    }

    /// Zero out a live lock without moving tokens, cancelling its pending
    /// slope-change entry. Used by proxy-to-delegate conversion. Returns the
    /// cancelled amount.
    pub(crate) fn cancel_lock(
        &mut self,
        account: &AccountId,
        now: Timestamp,
    ) -> Result<Knots, MooringError> {
        let old = self.active_unexpired_lock(account, now)?;
        self.locks.insert(*account, Lock::default());
        self.checkpoint_user(account, old, Lock::default(), now)?;
        Ok(old.amount)
    }

    /// Record uninjected delegation credit against `account`. While nonzero,
    /// every withdrawal path on the account fails with `SettlementPending`.
    pub(crate) fn add_pending_settlement(&mut self, account: &AccountId, amount: Knots) {
        *self.pending_settlement.entry(*account).or_insert(0) += amount;
    }

    /// Clear `amount` of uninjected credit once it lands in the lock.
    pub(crate) fn reduce_pending_settlement(&mut self, account: &AccountId, amount: Knots) {
        if let Some(pending) = self.pending_settlement.get_mut(account) {
            *pending = pending.saturating_sub(amount);
            if *pending == 0 {
                self.pending_settlement.remove(account);
            }
        }
    }

    // ---- internals --------------------------------------------------------

    fn require_settled(&self, account: &AccountId) -> Result<(), MooringError> {
        let pending = self.pending_settlement(account);
        if pending > 0 {
            return Err(MooringError::SettlementPending(format!(
                "{} of contributions are not yet injected",
                Mor(pending)
            )));
        }
        Ok(())
    }

    fn require_authorized(
        &self,
        auth: &dyn Authorizer,
        caller: &AccountId,
    ) -> Result<(), MooringError> {
        if auth.is_authorized(caller) {
            Ok(())
        } else {
            Err(MooringError::Unauthorized(
                "caller lacks the admin capability".to_string(),
            ))
        }
    }

    fn validate_new_lock(
        &self,
        account: &AccountId,
        amount: Knots,
        unlock_time: Timestamp,
        now: Timestamp,
    ) -> Result<Timestamp, MooringError> {
        if amount == 0 {
            return Err(MooringError::InvalidInput(
                "lock amount must be positive".to_string(),
            ));
        }
        if self.lock(account).is_some() {
            return Err(MooringError::InvalidState(
                "a lock is already active for this account".to_string(),
            ));
        }
        let unlock = week_floor(unlock_time);
        if unlock <= now {
            return Err(MooringError::InvalidInput(
                "lock duration rounds down to zero weeks".to_string(),
            ));
        }
        if unlock > now + MAX_LOCK_DURATION {
            return Err(MooringError::InvalidInput(
                "unlock time exceeds the 4-year maximum".to_string(),
            ));
        }
        Ok(unlock)
    }

    fn apply_created_lock(
        &mut self,
        account: &AccountId,
        amount: Knots,
        unlock: Timestamp,
        now: Timestamp,
    ) -> Result<(), MooringError> {
        let old = self.locks.get(account).copied().unwrap_or_default();
        let new = Lock {
            amount,
            end: unlock,
        };
        self.locks.insert(*account, new);
        self.checkpoint_user(account, old, new, now)?;
        debug!(amount, end = unlock, "created lock");
        Ok(())
    }

    fn active_unexpired_lock(
        &self,
        account: &AccountId,
        now: Timestamp,
    ) -> Result<Lock, MooringError> {
        let lock = self
            .lock(account)
            .ok_or_else(|| MooringError::NotFound("no active lock".to_string()))?;
        if lock.expired(now) {
            return Err(MooringError::InvalidState(
                "lock has expired; withdraw and create a new lock".to_string(),
            ));
        }
        Ok(lock)
    }

    /// Append `point` to the global history, overwriting the latest entry
    /// when it carries the same timestamp.
    fn push_global(&mut self, point: Point) {
        if let Some(last) = self.point_history.last_mut() {
            if last.ts == point.ts {
                *last = point;
                return;
            }
        }
        self.point_history.push(point);
    }

    fn push_user(&mut self, account: &AccountId, point: Point) {
        let history = self.user_point_history.entry(*account).or_default();
        if let Some(last) = history.last_mut() {
            if last.ts == point.ts {
                *last = point;
                return;
            }
        }
        history.push(point);
    }

    /// Walk the global history forward from its last recorded point to `now`
    /// one week at a time, applying scheduled slope changes at each boundary
    /// and recording a point per boundary.
    fn checkpoint_global(&mut self, now: Timestamp) {
        let Some(&last) = self.point_history.last() else {
            return;
        };
        let mut pt = last;
        if pt.ts >= now {
            return;
        }
        let mut t_i = week_floor(pt.ts);
        for _ in 0..MAX_CATCHUP_WEEKS {
            t_i += WEEK;
            let mut d_slope = 0i128;
            if t_i > now {
                t_i = now;
            } else {
                d_slope = self.slope_changes.get(&t_i).copied().unwrap_or(0);
            }
            pt.bias -= pt.slope * (t_i - pt.ts) as i128;
            if pt.bias < 0 {
                pt.bias = 0;
            }
            pt.slope += d_slope;
            if pt.slope < 0 {
                pt.slope = 0;
            }
            pt.ts = t_i;
            self.push_global(pt);
            if t_i == now {
                break;
            }
        }
    }

    fn set_slope_change(&mut self, t: Timestamp, value: i128) {
        if value == 0 {
            self.slope_changes.remove(&t);
        } else {
            self.slope_changes.insert(t, value);
        }
    }

    /// Record the transition of one account's lock from `old` to `new` at
    /// `now`: appends the user checkpoint, folds the delta into the global
    /// point, and keeps the slope-change schedule consistent.
    fn checkpoint_user(
        &mut self,
        account: &AccountId,
        old: Lock,
        new: Lock,
        now: Timestamp,
    ) -> Result<(), MooringError> {
        // The account's live contribution is read off its latest checkpoint,
        // decayed to `now` — recomputing from (amount, end) would not match
        // what the global point actually carries.
        let u_old = if old.is_active() && old.end > now {
            let last = self
                .user_point_history
                .get(account)
                .and_then(|h| h.last())
                .copied()
                .ok_or_else(|| {
                    MooringError::Invariant("active lock with no checkpoint history".to_string())
                })?;
            Point {
                bias: last.bias - last.slope * (now - last.ts) as i128,
                slope: last.slope,
                ts: now,
            }
        } else {
            Point::zero(now)
        };

        let u_new = if new.is_active() && new.end > now {
            let dt = (new.end - now) as i128;
            let slope = new.amount as i128 / dt;
            Point {
                bias: slope * dt,
                slope,
                ts: now,
            }
        } else {
            Point::zero(now)
        };

        // A live lock whose slope was scheduled must still have its entry;
        // a missing one means a prior operation corrupted the schedule.
        if old.is_active()
            && old.end > now
            && u_old.slope > 0
            && !self.slope_changes.contains_key(&old.end)
        {
            return Err(MooringError::Invariant(format!(
                "missing slope-change entry at lock end {}",
                old.end
            )));
        }
        let mut old_dslope = self.slope_changes.get(&old.end).copied().unwrap_or(0);
        let mut new_dslope = if new.end == old.end {
            old_dslope
        } else {
            self.slope_changes.get(&new.end).copied().unwrap_or(0)
        };

        self.checkpoint_global(now);
        if let Some(last) = self.point_history.last_mut() {
            last.bias += u_new.bias - u_old.bias;
            last.slope += u_new.slope - u_old.slope;
            if last.bias < 0 {
                last.bias = 0;
            }
            if last.slope < 0 {
                last.slope = 0;
            }
        }

        if old.end > now {
            // Cancel the old contribution at the old end...
            old_dslope += u_old.slope;
            if new.end == old.end {
                // ...and re-schedule the new one when the end is unchanged.
                old_dslope -= u_new.slope;
            }
            self.set_slope_change(old.end, old_dslope);
        }
        if new.end > now && new.end != old.end {
            new_dslope -= u_new.slope;
            self.set_slope_change(new.end, new_dslope);
        }

        self.push_user(account, u_new);
        Ok(())
    }
}

/// Whole weeks remaining until `end`, rounding a partial week up.
fn remaining_whole_weeks(end: Timestamp, now: Timestamp) -> u64 {
    if end <= now {
        0
    } else {
        ((end - now + WEEK - 1) / WEEK) as u64
    }
}
