// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.
//
// In-memory doubles for the external collaborators (SPEC_FULL §6): a
// scripted `KvStub`/`ChannelFactory` pair standing in for the transport,
// used by this crate's own tests and available to downstream callers that
// want to unit test code built on top of `RegionStoreClient` without a
// real cluster. Mirrors the role of the teacher's separate `mock-tikv`
// crate, folded in here because the production wire codec it mocked is
// out of scope.

use crate::channel::{Channel, ChannelFactory, KvStub};
use crate::error::{Error, Result};
use crate::proto::*;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

macro_rules! scripted_queue {
    ($field:ident, $resp:ty) => {
        pub fn $field(&self, outcome: Result<$resp>) {
            self.$field.lock().unwrap().push_back(outcome);
        }
    };
}

/// A `KvStub` whose responses are scripted in advance, one queue per
/// operation. Popping an empty queue panics: a test that under-scripts is
/// a test bug, not a runtime condition to handle gracefully.
#[derive(Default)]
pub struct ScriptedKvStub {
    get: Mutex<VecDeque<Result<GetResponse>>>,
    batch_get: Mutex<VecDeque<Result<BatchGetResponse>>>,
    scan: Mutex<VecDeque<Result<ScanResponse>>>,
    raw_get: Mutex<VecDeque<Result<RawGetResponse>>>,
    raw_put: Mutex<VecDeque<Result<RawPutResponse>>>,
    raw_batch_put: Mutex<VecDeque<Result<RawBatchPutResponse>>>,
    raw_delete: Mutex<VecDeque<Result<RawDeleteResponse>>>,
    raw_scan: Mutex<VecDeque<Result<RawScanResponse>>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl ScriptedKvStub {
    pub fn new() -> Self {
        Self::default()
    }

    scripted_queue!(get, GetResponse);
    scripted_queue!(batch_get, BatchGetResponse);
    scripted_queue!(scan, ScanResponse);
    scripted_queue!(raw_get, RawGetResponse);
    scripted_queue!(raw_put, RawPutResponse);
    scripted_queue!(raw_batch_put, RawBatchPutResponse);
    scripted_queue!(raw_delete, RawDeleteResponse);
    scripted_queue!(raw_scan, RawScanResponse);

    pub fn call_count(&self, op: &'static str) -> usize {
        *self.calls.lock().unwrap().get(op).unwrap_or(&0)
    }

    fn record(&self, op: &'static str) {
        *self.calls.lock().unwrap().entry(op).or_insert(0) += 1;
    }

    fn pop<T>(queue: &Mutex<VecDeque<Result<T>>>, op: &str) -> Result<T> {
        queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedKvStub::{} called with no scripted response left", op))
    }
}

#[async_trait]
impl KvStub for ScriptedKvStub {
    async fn get(&self, _req: GetRequest) -> Result<GetResponse> {
        self.record("get");
        Self::pop(&self.get, "get")
    }

    async fn batch_get(&self, _req: BatchGetRequest) -> Result<BatchGetResponse> {
        self.record("batch_get");
        Self::pop(&self.batch_get, "batch_get")
    }

    async fn scan(&self, _req: ScanRequest) -> Result<ScanResponse> {
        self.record("scan");
        Self::pop(&self.scan, "scan")
    }

    async fn raw_get(&self, _req: RawGetRequest) -> Result<RawGetResponse> {
        self.record("raw_get");
        Self::pop(&self.raw_get, "raw_get")
    }

    async fn raw_put(&self, _req: RawPutRequest) -> Result<RawPutResponse> {
        self.record("raw_put");
        Self::pop(&self.raw_put, "raw_put")
    }

    async fn raw_batch_put(&self, _req: RawBatchPutRequest) -> Result<RawBatchPutResponse> {
        self.record("raw_batch_put");
        Self::pop(&self.raw_batch_put, "raw_batch_put")
    }

    async fn raw_delete(&self, _req: RawDeleteRequest) -> Result<RawDeleteResponse> {
        self.record("raw_delete");
        Self::pop(&self.raw_delete, "raw_delete")
    }

    async fn raw_scan(&self, _req: RawScanRequest) -> Result<RawScanResponse> {
        self.record("raw_scan");
        Self::pop(&self.raw_scan, "raw_scan")
    }
}

/// Maps a store id to a pre-registered stub. `get_channel` fails if the
/// store id hasn't been registered, matching a real factory's behavior
/// for an address it can't dial.
#[derive(Default)]
pub struct StaticChannelFactory {
    stubs: Mutex<HashMap<u64, std::sync::Arc<dyn KvStub>>>,
    pub channel_requests: AtomicUsize,
}

impl StaticChannelFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, store_id: u64, stub: std::sync::Arc<dyn KvStub>) {
        self.stubs.lock().unwrap().insert(store_id, stub);
    }
}

#[async_trait]
impl ChannelFactory for StaticChannelFactory {
    async fn get_channel(&self, store_id: u64, address: &str) -> Result<Channel> {
        self.channel_requests.fetch_add(1, Ordering::SeqCst);
        let stub = self
            .stubs
            .lock()
            .unwrap()
            .get(&store_id)
            .cloned()
            .ok_or(Error::StoreNotFound { store_id })?;
        Ok(Channel {
            store_id,
            address: address.to_owned(),
            stub,
        })
    }
}
