// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.

use crate::region::{Key, Peer};
use crate::proto::{KeyError, RegionError};
use thiserror::Error;

/// The crate's only error currency. Every variant carries the structured
/// data that caused it so a caller (or a log line) can report specifics
/// without re-parsing a message string.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("store {store_id} has no address")]
    StoreHasNoAddress { store_id: u64 },

    #[error("client builder requires both a region and a store")]
    MissingBuildTarget,

    #[error("region {region_id} not found")]
    RegionNotFound { region_id: u64 },

    #[error("store {store_id} not found")]
    StoreNotFound { store_id: u64 },

    #[error("transport failure talking to store {store_id}: {message}")]
    Transport { store_id: u64, message: String },

    /// A region error that this client cannot recover from locally and
    /// surfaces to the caller, who is expected to rebuild against fresh
    /// routing (possibly after a region split).
    #[error("region exception for region {region_id}: {source:?}")]
    RegionError {
        region_id: u64,
        source: RegionError,
    },

    /// A non-lock key error, surfaced to the transaction layer above.
    #[error("key exception for key {key:?}: {source:?}")]
    KeyError { key: Key, source: KeyError },

    /// The raw KV wire protocol's plain error string, non-empty.
    #[error("raw kv error: {0}")]
    RawKeyError(String),

    #[error("lock resolution did not make progress and the retry budget is exhausted")]
    ResolveLockError,

    #[error("backoff budget exhausted after category {category:?}, last cause: {cause}")]
    BackoffExhausted {
        category: crate::backoff::BackoffCategory,
        cause: Box<Error>,
    },

    #[error("region {region_id}'s key range changed; caller must rebuild the client")]
    RegionSplit { region_id: u64, new_leader: Option<Peer> },
}

pub type Result<T> = std::result::Result<T, Error>;
