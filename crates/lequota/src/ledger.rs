//! The ledger itself
//!
//! One mutex guards the whole counter map: the check and the increment
//! happen inside a single critical section, so no two concurrent callers
//! can both observe the last unit of remaining quota. Window rollover is
//! lazy and happens inside the same critical section.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use tracing::debug;

use leseance::UserId;

use crate::limits::{Capability, QuotaLimits};

/// Outcome of one admission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    /// The unit was consumed.
    Allowed {
        /// Units left in the daily window, if capped.
        remaining_daily: Option<u32>,
        /// Units left in the monthly window, if capped.
        remaining_monthly: Option<u32>,
    },
    /// No capacity remains in at least one window; nothing was consumed.
    Exceeded {
        /// Displayable denial reason.
        reason: String,
    },
}

/// Read-only view of a user's standing for one capability.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaSnapshot {
    /// The capability described.
    pub capability: Capability,
    /// Units consumed in the current daily window.
    pub used_today: u32,
    /// Units consumed in the current monthly window.
    pub used_this_month: u32,
    /// Units left today, if capped.
    pub remaining_daily: Option<u32>,
    /// Units left this month, if capped.
    pub remaining_monthly: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    day_start: NaiveDate,
    day_count: u32,
    month_start: (i32, u32),
    month_count: u32,
}

impl Counter {
    fn fresh(now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        Self {
            day_start: today,
            day_count: 0,
            month_start: (today.year(), today.month()),
            month_count: 0,
        }
    }

    /// Reset any window `now` has moved past. Never revokes prior admissions.
    fn roll_over(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if self.day_start != today {
            self.day_start = today;
            self.day_count = 0;
        }
        let month = (today.year(), today.month());
        if self.month_start != month {
            self.month_start = month;
            self.month_count = 0;
        }
    }
}

/// Per-user, per-capability consumption ledger.
pub struct QuotaLedger {
    limits: QuotaLimits,
    counters: Mutex<HashMap<(UserId, Capability), Counter>>,
}

impl QuotaLedger {
    /// Create a ledger with the given limits.
    pub fn new(limits: QuotaLimits) -> Self {
        Self {
            limits,
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Atomically check remaining capacity and consume one unit.
    ///
    /// Under concurrent calls for the same user and capability, exactly as
    /// many calls succeed as the remaining quota allows.
    pub fn check_and_increment(&self, user: &UserId, capability: Capability) -> QuotaDecision {
        self.check_and_increment_at(user, capability, Utc::now())
    }

    fn check_and_increment_at(
        &self,
        user: &UserId,
        capability: Capability,
        now: DateTime<Utc>,
    ) -> QuotaDecision {
        let caps = self.limits.for_capability(capability);
        let mut counters = self.counters.lock().expect("quota ledger mutex poisoned");
        let counter = counters
            .entry((user.clone(), capability))
            .or_insert_with(|| Counter::fresh(now));
        counter.roll_over(now);

        if let Some(per_day) = caps.per_day {
            if counter.day_count >= per_day {
                debug!(user = %user, %capability, "daily quota denial");
                return QuotaDecision::Exceeded {
                    reason: format!("daily limit of {per_day} {capability} requests reached"),
                };
            }
        }
        if let Some(per_month) = caps.per_month {
            if counter.month_count >= per_month {
                debug!(user = %user, %capability, "monthly quota denial");
                return QuotaDecision::Exceeded {
                    reason: format!("monthly limit of {per_month} {capability} requests reached"),
                };
            }
        }

        counter.day_count += 1;
        counter.month_count += 1;
        QuotaDecision::Allowed {
            remaining_daily: caps.per_day.map(|cap| cap - counter.day_count),
            remaining_monthly: caps.per_month.map(|cap| cap - counter.month_count),
        }
    }

    /// Non-mutating view of one capability for one user.
    pub fn snapshot(&self, user: &UserId, capability: Capability) -> QuotaSnapshot {
        self.snapshot_at(user, capability, Utc::now())
    }

    fn snapshot_at(
        &self,
        user: &UserId,
        capability: Capability,
        now: DateTime<Utc>,
    ) -> QuotaSnapshot {
        let caps = self.limits.for_capability(capability);
        let counters = self.counters.lock().expect("quota ledger mutex poisoned");
        let mut counter = counters
            .get(&(user.clone(), capability))
            .copied()
            .unwrap_or_else(|| Counter::fresh(now));
        counter.roll_over(now);

        QuotaSnapshot {
            capability,
            used_today: counter.day_count,
            used_this_month: counter.month_count,
            remaining_daily: caps.per_day.map(|cap| cap.saturating_sub(counter.day_count)),
            remaining_monthly: caps
                .per_month
                .map(|cap| cap.saturating_sub(counter.month_count)),
        }
    }
}
