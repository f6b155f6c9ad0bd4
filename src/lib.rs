// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.

//! The per-region store client of a sharded key-value cluster: routing a
//! KV operation to the correct store replica, interpreting the cluster's
//! typed error responses, driving backoff retry loops, and cooperating
//! with a lock resolver to unblock reads that encounter transaction locks.
//!
//! The RPC transport, placement-driver discovery, and lock-resolution
//! protocol internals are external collaborators; this crate specifies
//! only their interfaces ([`pd::RegionManager`], [`channel::ChannelFactory`],
//! [`lock::LockResolver`]) and ships in-memory doubles for testing.

pub mod backoff;
pub mod builder;
pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod lock;
pub mod mock;
pub mod pd;
pub mod proto;
pub mod region;
pub mod retry;
pub mod stats;

pub use backoff::{BackOffer, Backoff, BackoffCategory};
pub use builder::ClientBuilder;
pub use client::RegionStoreClient;
pub use config::Config;
pub use error::{Error, Result};
pub use region::{Key, Peer, Region, RegionEpoch, Store};
