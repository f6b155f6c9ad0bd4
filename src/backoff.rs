// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.

use crate::error::Error;
use rand::Rng;
use std::time::Duration;

/// A failure category the retry driver sleeps against. Each category has
/// its own schedule so, e.g., a flood of lock contention doesn't eat the
/// budget meant for region discovery churn.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BackoffCategory {
    RegionMiss,
    TxnLockFast,
    Transport,
}

/// A jittered exponential-backoff schedule with a bounded number of steps.
/// `next_delay_duration` returns `None` once the schedule is exhausted,
/// which the caller turns into a fatal timeout.
#[derive(Clone, Debug, PartialEq)]
pub struct Backoff {
    current_attempts: u32,
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    current_delay_ms: u64,
    jitter: bool,
}

impl Backoff {
    pub const fn no_backoff() -> Self {
        Backoff {
            current_attempts: 0,
            max_attempts: 0,
            base_delay_ms: 0,
            max_delay_ms: 0,
            current_delay_ms: 0,
            jitter: false,
        }
    }

    /// A fixed-step schedule with no jitter, useful for deterministic tests.
    pub const fn no_jitter_backoff(base_delay_ms: u64, max_delay_ms: u64, max_attempts: u32) -> Self {
        Backoff {
            current_attempts: 0,
            max_attempts,
            base_delay_ms,
            max_delay_ms,
            current_delay_ms: base_delay_ms,
            jitter: false,
        }
    }

    /// A doubling schedule with decorrelated jitter, capped at `max_delay_ms`.
    pub const fn decorrelated_jitter_backoff(
        base_delay_ms: u64,
        max_delay_ms: u64,
        max_attempts: u32,
    ) -> Self {
        Backoff {
            current_attempts: 0,
            max_attempts,
            base_delay_ms,
            max_delay_ms,
            current_delay_ms: base_delay_ms,
            jitter: true,
        }
    }

    pub fn is_none(&self) -> bool {
        self.max_attempts == 0
    }

    /// Consume one step of the schedule, returning the delay to sleep
    /// before the next attempt, or `None` if the budget is exhausted.
    pub fn next_delay_duration(&mut self) -> Option<Duration> {
        if self.current_attempts >= self.max_attempts {
            return None;
        }
        self.current_attempts += 1;

        let delay_ms = if self.jitter {
            let upper = self.current_delay_ms.max(self.base_delay_ms);
            let jittered = rand::thread_rng().gen_range(self.base_delay_ms..=upper.max(self.base_delay_ms) + 1);
            self.current_delay_ms = (self.current_delay_ms * 2).min(self.max_delay_ms);
            jittered.min(self.max_delay_ms)
        } else {
            self.current_delay_ms.min(self.max_delay_ms)
        };

        Some(Duration::from_millis(delay_ms))
    }
}

/// Historical default schedules, named after the teacher's constants of the
/// same names (`DEFAULT_REGION_BACKOFF`, `OPTIMISTIC_BACKOFF`,
/// `PESSIMISTIC_BACKOFF`).
pub const DEFAULT_REGION_BACKOFF: Backoff = Backoff::decorrelated_jitter_backoff(2, 500, 10);
pub const OPTIMISTIC_BACKOFF: Backoff = Backoff::decorrelated_jitter_backoff(2, 500, 5);
pub const PESSIMISTIC_BACKOFF: Backoff = Backoff::decorrelated_jitter_backoff(10, 1000, 20);
pub const DEFAULT_TRANSPORT_BACKOFF: Backoff = Backoff::no_jitter_backoff(100, 1000, 5);

/// Caller-owned object carrying remaining retry budget, one `Backoff`
/// schedule per category. Single-threaded per call (SPEC_FULL §5).
#[derive(Clone, Debug)]
pub struct BackOffer {
    region_miss: Backoff,
    txn_lock_fast: Backoff,
    transport: Backoff,
}

impl BackOffer {
    pub fn new(region_miss: Backoff, txn_lock_fast: Backoff, transport: Backoff) -> Self {
        BackOffer {
            region_miss,
            txn_lock_fast,
            transport,
        }
    }

    pub fn default_optimistic() -> Self {
        BackOffer::new(DEFAULT_REGION_BACKOFF, OPTIMISTIC_BACKOFF, DEFAULT_TRANSPORT_BACKOFF)
    }

    pub fn default_pessimistic() -> Self {
        BackOffer::new(DEFAULT_REGION_BACKOFF, PESSIMISTIC_BACKOFF, DEFAULT_TRANSPORT_BACKOFF)
    }

    pub fn none() -> Self {
        BackOffer::new(Backoff::no_backoff(), Backoff::no_backoff(), Backoff::no_backoff())
    }

    /// Sleep according to `category`'s schedule, or fail if its budget is
    /// exhausted. `cause` is preserved in the fatal error so the caller
    /// sees what kept triggering retries.
    pub async fn do_backoff(&mut self, category: BackoffCategory, cause: Error) -> Result<(), Error> {
        let schedule = match category {
            BackoffCategory::RegionMiss => &mut self.region_miss,
            BackoffCategory::TxnLockFast => &mut self.txn_lock_fast,
            BackoffCategory::Transport => &mut self.transport,
        };
        match schedule.next_delay_duration() {
            Some(delay) => {
                log::debug!("backing off {:?} for {:?}: {}", category, delay, cause);
                futures_timer::Delay::new(delay).await;
                Ok(())
            }
            None => Err(Error::BackoffExhausted {
                category,
                cause: Box::new(cause),
            }),
        }
    }
}
