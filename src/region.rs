// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.

use std::fmt;

/// An opaque byte string used as a key or key bound. Keys sort
/// lexicographically by byte value, matching the cluster's keyspace order.
#[derive(Clone, Eq, PartialEq, PartialOrd, Ord, Hash, Default)]
pub struct Key(Vec<u8>);

impl Key {
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Key {
    fn from(v: Vec<u8>) -> Self {
        Key(v)
    }
}

impl From<&[u8]> for Key {
    fn from(v: &[u8]) -> Self {
        Key(v.to_vec())
    }
}

impl From<String> for Key {
    fn from(v: String) -> Self {
        Key(v.into_bytes())
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key(v.as_bytes().to_vec())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "Key({:?})", s),
            Err(_) => write!(f, "Key({:?})", self.0),
        }
    }
}

/// Monotonic pair advanced on membership change or split/merge.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub struct RegionEpoch {
    pub conf_ver: u64,
    pub version: u64,
}

/// One replica of one region on one store.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Peer {
    pub id: u64,
    pub store_id: u64,
}

/// A data-node descriptor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Store {
    pub id: u64,
    pub address: String,
}

/// Immutable snapshot of a region: id, epoch, half-open key range, and a
/// list of peers with exactly one marked leader. Observing a membership or
/// range change yields a new `Region` value; it never mutates in place.
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    pub id: u64,
    pub epoch: RegionEpoch,
    pub start_key: Key,
    /// Empty end key means +infinity.
    pub end_key: Key,
    pub peers: Vec<Peer>,
    pub leader: Peer,
}

impl Region {
    pub fn contains(&self, key: &Key) -> bool {
        key >= &self.start_key && (self.end_key.is_empty() || key < &self.end_key)
    }

    /// Whether this region's key range is identical to `other`'s; used to
    /// detect a split/merge that invalidates a cached leader hint.
    pub fn same_range(&self, other: &Region) -> bool {
        self.start_key == other.start_key && self.end_key == other.end_key
    }

    pub fn context(&self) -> crate::proto::Context {
        crate::proto::Context {
            region_id: self.id,
            region_epoch: self.epoch,
            peer: self.leader.clone(),
        }
    }
}
