// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.
//
// Grounded on `PlanBuilder::single_region`/`single_region_with_store` in
// the `client-rust` lineage (mashenjun-client-rust/src/request/plan_builder.rs):
// a stateless builder holding only the shared collaborators, offering both
// an explicit-store path and a key-lookup path that delegates to it.

use crate::channel::ChannelFactory;
use crate::client::RegionStoreClient;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::lock::LockResolver;
use crate::pd::RegionManager;
use crate::region::{Key, Region, Store};
use std::sync::Arc;

/// Constructs a `RegionStoreClient` for a given key or region, resolving
/// the leader store. Holds no mutable state; may be shared across threads
/// (SPEC_FULL §4.5).
pub struct ClientBuilder<M: RegionManager, C: ChannelFactory> {
    region_manager: Arc<M>,
    channel_factory: Arc<C>,
    config: Config,
}

impl<M: RegionManager, C: ChannelFactory> ClientBuilder<M, C> {
    pub fn new(region_manager: Arc<M>, channel_factory: Arc<C>, config: Config) -> Self {
        ClientBuilder {
            region_manager,
            channel_factory,
            config,
        }
    }

    /// Explicit construction path: acquires a channel to `store.address`
    /// and constructs a session bound to `region`/`store`.
    pub async fn build<L: LockResolver>(
        &self,
        region: Region,
        store: Store,
        lock_resolver: L,
    ) -> Result<RegionStoreClient<M, C, L>> {
        if store.address.is_empty() {
            return Err(Error::StoreHasNoAddress { store_id: store.id });
        }
        let channel = self.channel_factory.get_channel(store.id, &store.address).await?;
        log::info!("built client for region {} against store {} ({})", region.id, store.id, store.address);
        Ok(RegionStoreClient::new(
            region,
            channel,
            self.region_manager.clone(),
            self.channel_factory.clone(),
            lock_resolver,
            self.config,
        ))
    }

    /// Consults the region manager for the region and leader store that
    /// own `key`, then delegates to the explicit path.
    pub async fn build_for_key<L: LockResolver>(&self, key: &Key, lock_resolver: L) -> Result<RegionStoreClient<M, C, L>> {
        let (region, store) = self.region_manager.get_region_store_pair_by_key(key).await?;
        self.build(region, store, lock_resolver).await
    }

    /// Looks up the store by `region.leader.store_id`, then delegates to
    /// the explicit path.
    pub async fn build_for_region<L: LockResolver>(
        &self,
        region: Region,
        lock_resolver: L,
    ) -> Result<RegionStoreClient<M, C, L>> {
        let store = self.region_manager.get_store_by_id(region.leader.store_id).await?;
        self.build(region, store, lock_resolver).await
    }
}
