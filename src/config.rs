// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.

use derive_new::new;
use std::time::Duration;

/// Runtime configuration this crate recognizes (SPEC_FULL §6, §10.3). No
/// CLI surface, no file or environment parsing: the embedding application
/// constructs this programmatically and hands it to a `ClientBuilder`.
#[derive(new, Clone, Copy, Debug, PartialEq)]
pub struct Config {
    /// Per-RPC deadline. Applies to a single attempt, not the whole retry
    /// loop — the backoff budget covers the latter (SPEC_FULL §4.3).
    pub timeout: Duration,
    /// Default row limit for `scan`/`raw_scan` when the caller doesn't
    /// supply an explicit limit.
    pub scan_batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            timeout: Duration::from_secs(2),
            scan_batch_size: 256,
        }
    }
}
