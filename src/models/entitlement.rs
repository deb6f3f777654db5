//! Balance arithmetic for an entitlement account.
//!
//! These operations are pure; persistence and serialization live in
//! `services::entitlement_service`, which applies them under the
//! per-account lock.

use serde::Serialize;
use time::{OffsetDateTime, UtcOffset};

use super::common::ConsumedKind;

/// Free turns granted at provisioning and on every calendar-month reset
pub const FREE_MONTHLY_TURNS: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitlementState {
    pub free_turns: i32,
    pub paid_turns: i32,
    pub unlimited: bool,
    pub last_free_reset: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsufficientBalance {
    pub free_turns: i32,
    pub paid_turns: i32,
}

/// What a successful debit took and what is left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Debit {
    pub kind: ConsumedKind,
    pub balance_after: i32,
}

/// Read-only balance view returned by `get_balance`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshot {
    pub free: i32,
    pub paid: i32,
    pub total: i32,
    pub unlimited: bool,
}

impl EntitlementState {
    pub fn provisioned(now: OffsetDateTime) -> Self {
        Self {
            free_turns: FREE_MONTHLY_TURNS,
            paid_turns: 0,
            unlimited: false,
            last_free_reset: Some(now),
        }
    }

    pub fn total(&self) -> i32 {
        self.free_turns + self.paid_turns
    }

    pub fn snapshot(&self) -> BalanceSnapshot {
        BalanceSnapshot {
            free: self.free_turns,
            paid: self.paid_turns,
            total: self.total(),
            unlimited: self.unlimited,
        }
    }

    /// Add purchased turns. External credits only ever land on paid turns.
    pub fn credit(&mut self, turns: i32) -> i32 {
        self.paid_turns = self.paid_turns.saturating_add(turns.max(0));
        self.total()
    }

    /// Consume `turns`, free turns first. Unlimited accounts are never touched.
    pub fn debit(&mut self, turns: i32) -> Result<Debit, InsufficientBalance> {
        if self.unlimited {
            return Ok(Debit {
                kind: ConsumedKind::Unlimited,
                balance_after: self.total(),
            });
        }

        let turns = turns.max(0);
        if self.total() < turns {
            return Err(InsufficientBalance {
                free_turns: self.free_turns,
                paid_turns: self.paid_turns,
            });
        }

        let from_free = turns.min(self.free_turns);
        let from_paid = turns - from_free;
        self.free_turns -= from_free;
        self.paid_turns -= from_paid;

        let kind = if from_paid > 0 {
            ConsumedKind::Paid
        } else {
            ConsumedKind::Free
        };

        Ok(Debit {
            kind,
            balance_after: self.total(),
        })
    }

    /// Restore free turns when `now` falls in a later calendar month (UTC)
    /// than the last reset. Returns whether a reset happened; unlimited
    /// accounts are never reset.
    pub fn maybe_reset_free_turns(&mut self, now: OffsetDateTime) -> bool {
        if self.unlimited {
            return false;
        }

        let due = match self.last_free_reset {
            None => true,
            Some(last) => month_key(now) > month_key(last),
        };

        if due {
            self.free_turns = FREE_MONTHLY_TURNS;
            self.last_free_reset = Some(now);
        }

        due
    }
}

fn month_key(at: OffsetDateTime) -> (i32, u8) {
    let utc = at.to_offset(UtcOffset::UTC);
    (utc.year(), utc.month() as u8)
}
