// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.
//
// The lock-resolution protocol's internals are out of scope (SPEC_FULL.md
// §1); this module specifies only its contract and ships an in-memory
// double for tests.

use crate::backoff::BackOffer;
use crate::error::Result;
use crate::proto::LockInfo;
use async_trait::async_trait;

/// Given a batch of locks, attempts to commit or roll back the owning
/// transactions. Owned by the session for its lifetime (SPEC_FULL §3); it
/// shares the session's stubs and may itself issue RPCs to the same store
/// or, via the region manager, to others. It does not hold a back-pointer
/// to the client that owns it: cross-region work is done with short-lived
/// clients it constructs itself, breaking the client/resolver reference
/// cycle the spec calls out in §9.
#[async_trait]
pub trait LockResolver: Send + Sync {
    /// Returns `true` if every lock was resolved; `false` ("partial") if
    /// some locks are still outstanding and the caller should back off
    /// before retrying.
    async fn resolve_locks(&self, bo: &mut BackOffer, locks: Vec<LockInfo>) -> Result<bool>;
}

/// A scripted resolver for tests: returns the next outcome from a fixed
/// sequence (defaulting to `true` once the sequence is exhausted), and
/// counts how many times it was invoked.
pub struct ScriptedLockResolver {
    outcomes: std::sync::Mutex<std::collections::VecDeque<bool>>,
    pub calls: std::sync::atomic::AtomicUsize,
}

impl ScriptedLockResolver {
    pub fn new(outcomes: Vec<bool>) -> Self {
        ScriptedLockResolver {
            outcomes: std::sync::Mutex::new(outcomes.into_iter().collect()),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl LockResolver for ScriptedLockResolver {
    async fn resolve_locks(&self, _bo: &mut BackOffer, _locks: Vec<LockInfo>) -> Result<bool> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut outcomes = self.outcomes.lock().unwrap();
        Ok(outcomes.pop_front().unwrap_or(true))
    }
}
