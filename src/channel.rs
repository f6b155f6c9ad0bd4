// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.
//
// The RPC transport, message codec, and connection multiplexing are out of
// scope (SPEC_FULL.md §1); `KvStub` stands in for a bound gRPC client stub
// and `ChannelFactory` for the pooled channel lookup a real deployment
// would layer over `grpcio`/`tonic`.

use crate::error::Result;
use crate::proto::*;
use async_trait::async_trait;
use std::sync::Arc;

/// A transport-bound endpoint exposing the downstream KV wire contract
/// (SPEC_FULL §6). A real implementation dispatches each method over a
/// generated gRPC client; this crate only depends on the trait.
#[async_trait]
pub trait KvStub: Send + Sync {
    async fn get(&self, req: GetRequest) -> Result<GetResponse>;
    async fn batch_get(&self, req: BatchGetRequest) -> Result<BatchGetResponse>;
    async fn scan(&self, req: ScanRequest) -> Result<ScanResponse>;
    async fn raw_get(&self, req: RawGetRequest) -> Result<RawGetResponse>;
    async fn raw_put(&self, req: RawPutRequest) -> Result<RawPutResponse>;
    async fn raw_batch_put(&self, req: RawBatchPutRequest) -> Result<RawBatchPutResponse>;
    async fn raw_delete(&self, req: RawDeleteRequest) -> Result<RawDeleteResponse>;
    async fn raw_scan(&self, req: RawScanRequest) -> Result<RawScanResponse>;
}

/// A pooled, long-lived handle to a store's address, reference-shared and
/// possibly outliving any one `RegionStoreClient` (SPEC_FULL §5).
#[derive(Clone)]
pub struct Channel {
    pub store_id: u64,
    pub address: String,
    pub stub: Arc<dyn KvStub>,
}

/// Returns a pooled channel to a store address. Concurrently accessed by
/// many clients; implementations own their own synchronization.
#[async_trait]
pub trait ChannelFactory: Send + Sync {
    async fn get_channel(&self, store_id: u64, address: &str) -> Result<Channel>;
}
