// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.
//
// Hand-written stand-ins for the generated `kvrpcpb` wire types. The real
// codec (protobuf/gRPC generation) is out of scope for this crate (see
// SPEC_FULL.md §6); a deployment wires a `KvStub` implementation over the
// generated client and maps its responses into these shapes.

use crate::region::{Key, Peer, RegionEpoch};
use thiserror::Error;

/// Per-request routing trio the server validates against its own view.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Context {
    pub region_id: u64,
    pub region_epoch: RegionEpoch,
    pub peer: Peer,
}

/// An intention record left by an in-flight transaction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LockInfo {
    pub primary_lock: Key,
    pub lock_version: u64,
    pub key: Key,
    pub lock_ttl: u64,
}

/// Per-key error on a transactional (MVCC) response.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum KeyError {
    #[error("key locked: {0:?}")]
    Locked(LockInfo),
    #[error("key error: {0}")]
    Other(String),
}

/// Sum type of region-level rejections a store may return instead of
/// servicing a request.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum RegionError {
    #[error("not leader for region {region_id}: {leader:?}")]
    NotLeader {
        region_id: u64,
        leader: Option<Peer>,
    },
    #[error("store not match: requested {request_store_id}, actual {actual_store_id}")]
    StoreNotMatch {
        request_store_id: u64,
        actual_store_id: u64,
    },
    #[error("stale epoch")]
    StaleEpoch,
    #[error("region {region_id} not found")]
    RegionNotFound {
        region_id: u64,
    },
    #[error("key not in region {region_id}")]
    KeyNotInRegion {
        key: Key,
        region_id: u64,
    },
    #[error("server is busy: {reason}")]
    ServerIsBusy {
        reason: String,
    },
    #[error("raft entry too large in region {region_id}")]
    RaftEntryTooLarge {
        region_id: u64,
    },
    #[error("region error: {0}")]
    Other(String),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KvPair {
    pub key: Key,
    pub value: Vec<u8>,
    pub error: Option<KeyError>,
}

#[derive(Clone, Debug)]
pub struct GetRequest {
    pub context: Context,
    pub key: Key,
    pub version: u64,
}

#[derive(Clone, Debug, Default)]
pub struct GetResponse {
    pub region_error: Option<RegionError>,
    pub error: Option<KeyError>,
    pub value: Vec<u8>,
    pub not_found: bool,
}

#[derive(Clone, Debug)]
pub struct BatchGetRequest {
    pub context: Context,
    pub keys: Vec<Key>,
    pub version: u64,
}

#[derive(Clone, Debug, Default)]
pub struct BatchGetResponse {
    pub region_error: Option<RegionError>,
    pub pairs: Vec<KvPair>,
}

#[derive(Clone, Debug)]
pub struct ScanRequest {
    pub context: Context,
    pub start_key: Key,
    pub version: u64,
    pub limit: u32,
    pub key_only: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ScanResponse {
    pub region_error: Option<RegionError>,
    pub pairs: Vec<KvPair>,
}

#[derive(Clone, Debug)]
pub struct RawGetRequest {
    pub context: Context,
    pub key: Key,
    pub cf: Option<Vec<u8>>,
}

#[derive(Clone, Debug, Default)]
pub struct RawGetResponse {
    pub region_error: Option<RegionError>,
    pub error: String,
    pub value: Vec<u8>,
    pub not_found: bool,
}

#[derive(Clone, Debug)]
pub struct RawPutRequest {
    pub context: Context,
    pub key: Key,
    pub value: Vec<u8>,
    pub cf: Option<Vec<u8>>,
}

#[derive(Clone, Debug, Default)]
pub struct RawPutResponse {
    pub region_error: Option<RegionError>,
    pub error: String,
}

#[derive(Clone, Debug)]
pub struct RawBatchPutRequest {
    pub context: Context,
    pub pairs: Vec<(Key, Vec<u8>)>,
    pub cf: Option<Vec<u8>>,
}

#[derive(Clone, Debug, Default)]
pub struct RawBatchPutResponse {
    pub region_error: Option<RegionError>,
    /// Only the region-level error is inspected by this crate; the wire
    /// protocol for this RPC is assumed to never populate a per-pair error
    /// (SPEC_FULL.md §11, decision D3).
    pub error: String,
}

#[derive(Clone, Debug)]
pub struct RawDeleteRequest {
    pub context: Context,
    pub key: Key,
    pub cf: Option<Vec<u8>>,
}

#[derive(Clone, Debug, Default)]
pub struct RawDeleteResponse {
    pub region_error: Option<RegionError>,
    pub error: String,
}

#[derive(Clone, Debug)]
pub struct RawScanRequest {
    pub context: Context,
    pub start_key: Key,
    pub cf: Option<Vec<u8>>,
    pub limit: u32,
    pub key_only: bool,
}

#[derive(Clone, Debug, Default)]
pub struct RawScanResponse {
    pub region_error: Option<RegionError>,
    pub pairs: Vec<KvPair>,
}
