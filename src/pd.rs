// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.
//
// Discovery of regions from a placement driver is out of scope
// (SPEC_FULL.md §1); this module specifies only the contract this crate
// consumes and ships an in-memory double for tests.

use crate::error::{Error, Result};
use crate::region::{Key, Region, Store};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Maps a key/region-id to a current `(Region, Store)` pair; invalidates
/// entries on failure signals. The cache is process-wide and shared across
/// clients (SPEC_FULL §3); implementations own their own synchronization
/// and return immutable snapshots.
#[async_trait]
pub trait RegionManager: Send + Sync {
    async fn get_region_by_key(&self, key: &Key) -> Result<Region>;
    async fn get_region_by_id(&self, id: u64) -> Result<Region>;
    async fn get_store_by_id(&self, id: u64) -> Result<Store>;

    async fn get_region_store_pair_by_key(&self, key: &Key) -> Result<(Region, Store)> {
        let region = self.get_region_by_key(key).await?;
        let store = self.get_store_by_id(region.leader.store_id).await?;
        Ok((region, store))
    }

    /// Evict/invalidate the routing entry for `region` after a transport
    /// failure or null response.
    fn on_request_fail(&self, region: &Region);
}

/// An in-memory region/store table for tests, addressable by key and by
/// id, with mutable entries so a test can simulate a leader change or
/// split between calls.
#[derive(Default)]
pub struct MockRegionManager {
    regions: Mutex<Vec<Region>>,
    stores: Mutex<HashMap<u64, Store>>,
    pub invalidated: Mutex<Vec<u64>>,
}

impl MockRegionManager {
    pub fn new(regions: Vec<Region>, stores: Vec<Store>) -> Self {
        MockRegionManager {
            regions: Mutex::new(regions),
            stores: Mutex::new(stores.into_iter().map(|s| (s.id, s)).collect()),
            invalidated: Mutex::new(Vec::new()),
        }
    }

    /// Replace the cached region with the same id, simulating a fresh PD
    /// lookup result (leader change, epoch bump, or split).
    pub fn set_region(&self, region: Region) {
        let mut regions = self.regions.lock().unwrap();
        if let Some(slot) = regions.iter_mut().find(|r| r.id == region.id) {
            *slot = region;
        } else {
            regions.push(region);
        }
    }
}

#[async_trait]
impl RegionManager for MockRegionManager {
    async fn get_region_by_key(&self, key: &Key) -> Result<Region> {
        self.regions
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.contains(key))
            .cloned()
            .ok_or_else(|| Error::RegionNotFound { region_id: 0 })
    }

    async fn get_region_by_id(&self, id: u64) -> Result<Region> {
        self.regions
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(Error::RegionNotFound { region_id: id })
    }

    async fn get_store_by_id(&self, id: u64) -> Result<Store> {
        self.stores
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(Error::StoreNotFound { store_id: id })
    }

    fn on_request_fail(&self, region: &Region) {
        self.invalidated.lock().unwrap().push(region.id);
    }
}
