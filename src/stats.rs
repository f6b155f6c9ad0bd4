// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.
//
// Mirrors the teacher's `stats::tikv_stats` instrumentation point around
// `Dispatch::execute` (src/request/plan.rs): one histogram for RPC
// latency, one counter for RPC failures, both labeled by operation name.

use lazy_static::lazy_static;
use prometheus::{exponential_buckets, HistogramVec, IntCounterVec};
use std::time::Instant;

lazy_static! {
    static ref KV_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "region_store_client_request_duration_seconds",
            "Latency of per-region store client RPCs, by operation."
        )
        .buckets(exponential_buckets(0.001, 2.0, 16).unwrap()),
        &["operation"]
    )
    .unwrap();
    static ref KV_REQUEST_FAILURES: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "region_store_client_request_failures_total",
            "Count of per-region store client RPCs that ended in an error, by operation."
        ),
        &["operation"]
    )
    .unwrap();
}

/// RAII-ish timer: call `done` with the RPC's outcome to record both the
/// latency and, on failure, the failure counter.
pub struct RequestStats {
    operation: &'static str,
    start: Instant,
}

pub fn request_stats(operation: &'static str) -> RequestStats {
    RequestStats {
        operation,
        start: Instant::now(),
    }
}

impl RequestStats {
    pub fn done<T, E>(self, result: std::result::Result<T, E>) -> std::result::Result<T, E> {
        KV_REQUEST_DURATION
            .with_label_values(&[self.operation])
            .observe(self.start.elapsed().as_secs_f64());
        if result.is_err() {
            KV_REQUEST_FAILURES.with_label_values(&[self.operation]).inc();
        }
        result
    }
}
