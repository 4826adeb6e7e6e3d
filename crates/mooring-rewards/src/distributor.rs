// crates/mooring-rewards/src/distributor.rs
//
// Weekly reward distribution over historical escrow balances.
//
// The distributor's token account receives reward injections; a token
// checkpoint measures the balance delta since the last checkpoint and
// spreads it across the weeks elapsed in between, so a single late
// injection is smoothed instead of credited entirely to one week. Total
// supply is snapshotted week by week through a cursor, and claims walk an
// account's unsettled weeks computing balance/supply * tokensPerWeek.
//
// Integer-division truncation means the sum of all claims for a week can be
// slightly less than that week's bucket; the dust stays in the distributor's
// account. Conservation at checkpoint time is exact: the newest bucket
// absorbs the split remainder, so no knot is created or lost.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use mooring_core::{
    week_floor, AccountId, Authorizer, Knots, MooringError, Timestamp, TokenLedger, WEEK,
};
use mooring_escrow::{ProxyRegistry, VoteEscrow};

/// A token checkpoint is auto-invoked from `claim` only when the last one is
/// older than this deadline, bounding the per-claim cost.
pub const TOKEN_CHECKPOINT_DEADLINE: i64 = 24 * 3600;

/// Maximum week buckets a single token checkpoint spreads over.
pub const MAX_TOKEN_CHECKPOINT_WEEKS: usize = 40;

/// Maximum supply snapshots taken per catch-up call.
pub const MAX_SUPPLY_CHECKPOINT_WEEKS: usize = 20;

/// Maximum weeks settled per claim call.
pub const MAX_CLAIM_WEEKS: usize = 50;

/// The checkpoint-based revenue distribution ledger.
pub struct RewardDistributor {
    /// The distributor's own reward-token account. Injections are transfers
    /// into this account; claims are transfers out of it.
    account: AccountId,
    /// First week the distributor covers.
    start_week: Timestamp,
    /// Next week boundary awaiting a total-supply snapshot.
    week_cursor: Timestamp,
    last_token_timestamp: Timestamp,
    last_token_balance: Knots,
    tokens_per_week: BTreeMap<Timestamp, Knots>,
    supply_at: BTreeMap<Timestamp, Knots>,
    user_cursor: HashMap<AccountId, Timestamp>,
    recipient_override: HashMap<AccountId, AccountId>,
    can_checkpoint_token: bool,
}

impl RewardDistributor {
    /// Create a distributor paying from `account`, covering weeks from
    /// `start_time` (rounded down to a week boundary) onward.
    pub fn new(account: AccountId, start_time: Timestamp) -> Self {
        let start_week = week_floor(start_time);
        Self {
            account,
            start_week,
            week_cursor: start_week,
            last_token_timestamp: start_time,
            last_token_balance: 0,
            tokens_per_week: BTreeMap::new(),
            supply_at: BTreeMap::new(),
            user_cursor: HashMap::new(),
            recipient_override: HashMap::new(),
            can_checkpoint_token: false,
        }
    }

    // ---- queries ----------------------------------------------------------

    /// The distributor's reward-token account.
    pub fn account(&self) -> AccountId {
        self.account
    }

    /// Reward tokens bucketed into the week starting at `week`.
    pub fn tokens_per_week(&self, week: Timestamp) -> Knots {
        self.tokens_per_week.get(&week).copied().unwrap_or(0)
    }

    /// Recorded total-supply snapshot for the week starting at `week`.
    pub fn supply_at(&self, week: Timestamp) -> Knots {
        self.supply_at.get(&week).copied().unwrap_or(0)
    }

    /// Next week boundary awaiting a supply snapshot.
    pub fn week_cursor(&self) -> Timestamp {
        self.week_cursor
    }

    /// The account's last-settled-week cursor, if it has claimed before.
    pub fn user_cursor(&self, account: &AccountId) -> Option<Timestamp> {
        self.user_cursor.get(account).copied()
    }

    /// Timestamp of the last token checkpoint.
    pub fn last_token_timestamp(&self) -> Timestamp {
        self.last_token_timestamp
    }

    /// The account's claim redirect, if configured.
    pub fn recipient_of(&self, account: &AccountId) -> Option<AccountId> {
        self.recipient_override.get(account).copied()
    }

    // ---- checkpoints ------------------------------------------------------

    /// Checkpoint newly received reward tokens into weekly buckets.
    ///
    /// The balance delta since the last checkpoint is spread across the
    /// weeks elapsed since then: the first (partial) week proportionally to
    /// the time it covers, each full week evenly, and the newest bucket
    /// absorbs the integer-division remainder so the split conserves the
    /// delta exactly.
    pub fn checkpoint_token(
        &mut self,
        token: &dyn TokenLedger,
        now: Timestamp,
    ) -> Result<(), MooringError> {
        if now < self.last_token_timestamp {
            return Err(MooringError::InvalidInput(
                "token checkpoint time precedes the last checkpoint".to_string(),
            ));
        }
        let balance = token.balance_of(&self.account);
        let delta = balance.checked_sub(self.last_token_balance).ok_or_else(|| {
            MooringError::Invariant("reward balance decreased outside of claims".to_string())
        })?;
        self.last_token_balance = balance;

        let mut t = self.last_token_timestamp;
        let since_last = (now - t) as u128;
        self.last_token_timestamp = now;
        let mut this_week = week_floor(t);
        let delta = delta as u128;
        let mut allocated: u128 = 0;

        for i in 0..MAX_TOKEN_CHECKPOINT_WEEKS {
            let next_week = this_week + WEEK;
            if now < next_week || i == MAX_TOKEN_CHECKPOINT_WEEKS - 1 {
                // Newest bucket absorbs the remainder: exact conservation.
                let credit = (delta - allocated) as u64;
                if credit > 0 {
                    *self.tokens_per_week.entry(this_week).or_insert(0) += credit;
                }
                break;
            }
            let share = if since_last == 0 {
                delta
            } else {
                (delta * (next_week - t) as u128 / since_last).min(delta - allocated)
            };
            if share > 0 {
                *self.tokens_per_week.entry(this_week).or_insert(0) += share as u64;
            }
            allocated += share;
            t = next_week;
            this_week = next_week;
        }
        debug!(delta = delta as u64, "token checkpoint");
        Ok(())
    }

    /// Snapshot escrow total supply week by week, advancing the cursor.
    ///
    /// Bounded per call; invoke repeatedly to fully catch up after long
    /// gaps. Re-invoking at the same instant once caught up changes nothing.
    pub fn checkpoint_total_supply(&mut self, escrow: &VoteEscrow, now: Timestamp) {
        let rounded_now = week_floor(now);
        for _ in 0..MAX_SUPPLY_CHECKPOINT_WEEKS {
            if self.week_cursor > rounded_now {
                break;
            }
            let supply = escrow.total_supply_at(self.week_cursor);
            self.supply_at.insert(self.week_cursor, supply);
            self.week_cursor += WEEK;
        }
    }

    // ---- claims -----------------------------------------------------------

    /// Settle the account's elapsed weeks and transfer its pro-rata share
    /// once. A claim that settles nothing transfers exactly zero and is not
    /// an error.
    ///
    /// Weeks not yet covered by a token checkpoint stay pending rather than
    /// being settled at zero, so rewards injected late are never forfeited.
    ///
    /// The paying recipient is resolved as: explicit override, else the
    /// proxy's owning account, else the account itself.
    pub fn claim(
        &mut self,
        escrow: &VoteEscrow,
        proxies: &ProxyRegistry,
        token: &mut dyn TokenLedger,
        account: &AccountId,
        now: Timestamp,
    ) -> Result<Knots, MooringError> {
        if self.can_checkpoint_token
            && now > self.last_token_timestamp + TOKEN_CHECKPOINT_DEADLINE
        {
            self.checkpoint_token(token, now)?;
        }
        self.checkpoint_total_supply(escrow, now);

        let mut cursor = match self.user_cursor.get(account).copied() {
            Some(c) => c,
            None => match escrow.first_user_point_ts(account) {
                // Start at the first full week after the account appeared.
                Some(first) => week_floor(first + WEEK - 1),
                None => return Ok(0),
            },
        };
        if cursor < self.start_week {
            cursor = self.start_week;
        }
        // A week is claimable only once it has fully elapsed, its supply
        // snapshot exists, and its bucket is final — i.e. a token checkpoint
        // has covered it. The cursor must never cross a week whose injection
        // has not been bucketed yet, or that reward is forfeited forever.
        let frontier = week_floor(now)
            .min(self.week_cursor)
            .min(week_floor(self.last_token_timestamp));

        let mut amount: Knots = 0;
        for _ in 0..MAX_CLAIM_WEEKS {
            if cursor >= frontier {
                break;
            }
            let supply = self.supply_at.get(&cursor).copied().unwrap_or(0);
            if supply > 0 {
                let balance = escrow.balance_of_at(account, cursor) as u128;
                let tokens = self.tokens_per_week.get(&cursor).copied().unwrap_or(0) as u128;
                amount = amount.saturating_add((balance * tokens / supply as u128) as u64);
            }
            cursor += WEEK;
        }
        self.user_cursor.insert(*account, cursor);

        if amount > 0 {
            let payee = self.resolve_recipient(proxies, account);
            token.transfer(&self.account, &payee, amount)?;
            self.last_token_balance = self.last_token_balance.saturating_sub(amount);
            debug!(amount, "claim settled");
        }
        Ok(amount)
    }

    /// The share the account would receive for a single already-elapsed
    /// week, ignoring its claim cursor. Read-only.
    ///
    /// # Errors
    /// Rejects a week that has not fully elapsed yet.
    pub fn claimable_for_week(
        &self,
        escrow: &VoteEscrow,
        account: &AccountId,
        week: Timestamp,
        now: Timestamp,
    ) -> Result<Knots, MooringError> {
        let week = week_floor(week);
        if week >= week_floor(now) {
            return Err(MooringError::InvalidInput(
                "week has not elapsed yet".to_string(),
            ));
        }
        let supply = self.supply_at.get(&week).copied().unwrap_or(0);
        if supply == 0 {
            return Ok(0);
        }
        let balance = escrow.balance_of_at(account, week) as u128;
        let tokens = self.tokens_per_week.get(&week).copied().unwrap_or(0) as u128;
        Ok((balance * tokens / supply as u128) as u64)
    }

    fn resolve_recipient(&self, proxies: &ProxyRegistry, account: &AccountId) -> AccountId {
        if let Some(recipient) = self.recipient_override.get(account) {
            return *recipient;
        }
        if let Some(owner) = proxies.resolve_owner(account) {
            return owner;
        }
        *account
    }

    // ---- admin ------------------------------------------------------------

    /// Redirect (or clear) where the caller's claims are paid.
    pub fn set_recipient(&mut self, caller: &AccountId, recipient: Option<AccountId>) {
        match recipient {
            Some(r) => {
                self.recipient_override.insert(*caller, r);
            }
            None => {
                self.recipient_override.remove(caller);
            }
        }
    }

    /// Toggle auto token checkpointing from claims. Authorized callers only.
    pub fn set_can_checkpoint_token(
        &mut self,
        auth: &dyn Authorizer,
        caller: &AccountId,
        enabled: bool,
    ) -> Result<(), MooringError> {
        if !auth.is_authorized(caller) {
            return Err(MooringError::Unauthorized(
                "caller may not toggle token checkpointing".to_string(),
            ));
        }
        self.can_checkpoint_token = enabled;
        Ok(())
    }
}
