// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.
//
// End-to-end scenarios from SPEC_FULL.md §8, run against the in-memory
// `RegionManager`/`ChannelFactory`/`KvStub`/`LockResolver` doubles.

use region_store_client::backoff::{Backoff, BackOffer};
use region_store_client::channel::ChannelFactory;
use region_store_client::client::RegionStoreClient;
use region_store_client::config::Config;
use region_store_client::error::Error;
use region_store_client::lock::ScriptedLockResolver;
use region_store_client::mock::{ScriptedKvStub, StaticChannelFactory};
use region_store_client::pd::MockRegionManager;
use region_store_client::proto::*;
use region_store_client::region::{Peer, Region, RegionEpoch, Store};
use std::sync::Arc;

fn region(id: u64, start: &str, end: &str, version: u64, leader_store: u64) -> Region {
    Region {
        id,
        epoch: RegionEpoch { conf_ver: 1, version },
        start_key: start.into(),
        end_key: end.into(),
        peers: vec![Peer { id: 100 + leader_store, store_id: leader_store }],
        leader: Peer { id: 100 + leader_store, store_id: leader_store },
    }
}

fn store(id: u64) -> Store {
    Store { id, address: format!("store-{}:20160", id) }
}

/// A backoff budget generous enough that the scenario tests only fail if
/// the code under test does something other than what's scripted, not
/// because the budget ran out first.
fn generous_bo() -> BackOffer {
    BackOffer::new(
        Backoff::no_jitter_backoff(1, 1, 5),
        Backoff::no_jitter_backoff(1, 1, 5),
        Backoff::no_jitter_backoff(1, 1, 5),
    )
}

#[tokio::test]
async fn scenario_1_happy_get() {
    let r1 = region(1, "a", "m", 1, 1);
    let manager = Arc::new(MockRegionManager::new(vec![r1.clone()], vec![store(1)]));
    let stub = Arc::new(ScriptedKvStub::new());
    stub.get(Ok(GetResponse {
        value: b"v".to_vec(),
        ..Default::default()
    }));
    let channels = Arc::new(StaticChannelFactory::new());
    channels.register(1, stub.clone());

    let channel = channels.get_channel(1, &store(1).address).await.unwrap();
    let mut client = RegionStoreClient::new(
        r1,
        channel,
        manager.clone(),
        channels.clone(),
        ScriptedLockResolver::new(vec![]),
        Config::default(),
    );

    let mut bo = generous_bo();
    let value = client.get(&mut bo, "ka".into(), 100).await.unwrap();

    assert_eq!(value, b"v".to_vec());
    assert_eq!(stub.call_count("get"), 1);
    assert!(manager.invalidated.lock().unwrap().is_empty());
}

#[tokio::test]
async fn scenario_2_locked_get_resolves_and_retries() {
    let r1 = region(1, "a", "m", 1, 1);
    let manager = Arc::new(MockRegionManager::new(vec![r1.clone()], vec![store(1)]));
    let stub = Arc::new(ScriptedKvStub::new());
    stub.get(Ok(GetResponse {
        error: Some(KeyError::Locked(LockInfo {
            primary_lock: "k0".into(),
            lock_version: 99,
            key: "ka".into(),
            lock_ttl: 3000,
        })),
        ..Default::default()
    }));
    stub.get(Ok(GetResponse {
        value: b"v2".to_vec(),
        ..Default::default()
    }));
    let channels = Arc::new(StaticChannelFactory::new());
    channels.register(1, stub.clone());
    let channel = channels.get_channel(1, &store(1).address).await.unwrap();

    let resolver = ScriptedLockResolver::new(vec![true]);
    let mut client = RegionStoreClient::new(r1, channel, manager, channels, resolver, Config::default());

    let mut bo = generous_bo();
    let value = client.get(&mut bo, "ka".into(), 100).await.unwrap();

    assert_eq!(value, b"v2".to_vec());
    assert_eq!(stub.call_count("get"), 2);
}

#[tokio::test]
async fn scenario_3_region_miss_refreshes_and_retries() {
    let r1 = region(1, "a", "m", 1, 1);
    let r1_new_epoch = region(1, "a", "m", 2, 1);
    let manager = Arc::new(MockRegionManager::new(vec![r1.clone()], vec![store(1)]));

    let stub = Arc::new(ScriptedKvStub::new());
    stub.get(Ok(GetResponse {
        region_error: Some(RegionError::StaleEpoch),
        ..Default::default()
    }));
    stub.get(Ok(GetResponse {
        value: b"v".to_vec(),
        ..Default::default()
    }));
    let channels = Arc::new(StaticChannelFactory::new());
    channels.register(1, stub.clone());
    let channel = channels.get_channel(1, &store(1).address).await.unwrap();

    let mut client = RegionStoreClient::new(
        r1,
        channel,
        manager.clone(),
        channels,
        ScriptedLockResolver::new(vec![]),
        Config::default(),
    );

    // PD already knows about the bumped epoch by the time the refresh fires.
    manager.set_region(r1_new_epoch.clone());

    let mut bo = BackOffer::new(
        Backoff::no_jitter_backoff(1, 1, 5),
        Backoff::no_backoff(),
        Backoff::no_backoff(),
    );
    let value = client.get(&mut bo, "ka".into(), 100).await.unwrap();

    assert_eq!(value, b"v".to_vec());
    assert_eq!(stub.call_count("get"), 2);
    assert_eq!(client.region().epoch.version, 2);
}

#[tokio::test]
async fn scenario_4_not_leader_with_range_change_surfaces_region_split() {
    let r1 = region(1, "a", "m", 1, 1);
    // The fresh lookup by id reveals the range changed (a split happened).
    let r1_split = region(1, "a0", "m", 1, 2);
    let manager = Arc::new(MockRegionManager::new(vec![r1.clone()], vec![store(1), store(2)]));

    let stub = Arc::new(ScriptedKvStub::new());
    stub.get(Ok(GetResponse {
        region_error: Some(RegionError::NotLeader {
            region_id: 1,
            leader: Some(Peer { id: 102, store_id: 2 }),
        }),
        ..Default::default()
    }));
    let channels = Arc::new(StaticChannelFactory::new());
    channels.register(1, stub.clone());
    channels.register(2, stub.clone());
    let channel = channels.get_channel(1, &store(1).address).await.unwrap();

    let mut client = RegionStoreClient::new(
        r1,
        channel,
        manager.clone(),
        channels,
        ScriptedLockResolver::new(vec![]),
        Config::default(),
    );

    manager.set_region(r1_split);

    let mut bo = generous_bo();
    let err = client.get(&mut bo, "ka".into(), 100).await.unwrap_err();

    assert!(matches!(err, Error::RegionSplit { region_id: 1, .. }));
    assert_eq!(stub.call_count("get"), 1);
}

#[tokio::test]
async fn scenario_5_raw_put_with_column_family() {
    let r1 = region(1, "a", "m", 1, 1);
    let manager = Arc::new(MockRegionManager::new(vec![r1.clone()], vec![store(1)]));
    let stub = Arc::new(ScriptedKvStub::new());
    stub.raw_put(Ok(RawPutResponse::default()));
    let channels = Arc::new(StaticChannelFactory::new());
    channels.register(1, stub.clone());
    let channel = channels.get_channel(1, &store(1).address).await.unwrap();

    let client = RegionStoreClient::new(r1, channel, manager, channels, ScriptedLockResolver::new(vec![]), Config::default());

    let mut bo = generous_bo();
    client
        .raw_put(&mut bo, "k".into(), b"v".to_vec(), Some(b"write".to_vec()))
        .await
        .unwrap();

    assert_eq!(stub.call_count("raw_put"), 1);
}

#[tokio::test]
async fn scenario_6_batch_get_partial_lock_returns_original_pairs() {
    let r1 = region(1, "a", "m", 1, 1);
    let manager = Arc::new(MockRegionManager::new(vec![r1.clone()], vec![store(1)]));
    let stub = Arc::new(ScriptedKvStub::new());
    let locked = KeyError::Locked(LockInfo {
        primary_lock: "a".into(),
        lock_version: 7,
        key: "b".into(),
        lock_ttl: 3000,
    });
    stub.batch_get(Ok(BatchGetResponse {
        region_error: None,
        pairs: vec![
            KvPair { key: "a".into(), value: b"1".to_vec(), error: None },
            KvPair { key: "b".into(), value: vec![], error: Some(locked) },
            KvPair { key: "c".into(), value: b"3".to_vec(), error: None },
        ],
    }));
    let channels = Arc::new(StaticChannelFactory::new());
    channels.register(1, stub.clone());
    let channel = channels.get_channel(1, &store(1).address).await.unwrap();

    let resolver = ScriptedLockResolver::new(vec![false]);
    let client = RegionStoreClient::new(r1, channel, manager, channels, resolver, Config::default());

    let mut bo = BackOffer::new(
        Backoff::no_backoff(),
        Backoff::no_jitter_backoff(1, 1, 3),
        Backoff::no_backoff(),
    );
    let pairs = client
        .batch_get(&mut bo, vec!["a".into(), "b".into(), "c".into()], 100)
        .await
        .unwrap();

    assert_eq!(pairs.len(), 3);
    assert!(pairs[1].error.is_some(), "the locked pair is returned as-is, per decision D1");
    assert_eq!(stub.call_count("batch_get"), 1);
}

#[tokio::test]
async fn raw_batch_put_empty_input_is_a_noop() {
    let r1 = region(1, "a", "m", 1, 1);
    let manager = Arc::new(MockRegionManager::new(vec![r1.clone()], vec![store(1)]));
    let stub = Arc::new(ScriptedKvStub::new());
    let channels = Arc::new(StaticChannelFactory::new());
    channels.register(1, stub.clone());
    let channel = channels.get_channel(1, &store(1).address).await.unwrap();

    let client = RegionStoreClient::new(r1, channel, manager, channels, ScriptedLockResolver::new(vec![]), Config::default());

    let mut bo = generous_bo();
    client.raw_batch_put(&mut bo, vec![], None).await.unwrap();

    assert_eq!(stub.call_count("raw_batch_put"), 0);
}

#[tokio::test]
async fn store_not_match_rebinds_channel_without_backoff() {
    let r1 = region(1, "a", "m", 1, 1);
    let manager = Arc::new(MockRegionManager::new(vec![r1.clone()], vec![store(1), store(2)]));
    let stub1 = Arc::new(ScriptedKvStub::new());
    let stub2 = Arc::new(ScriptedKvStub::new());
    stub1.get(Ok(GetResponse {
        region_error: Some(RegionError::StoreNotMatch {
            request_store_id: 1,
            actual_store_id: 2,
        }),
        ..Default::default()
    }));
    stub2.get(Ok(GetResponse {
        value: b"v".to_vec(),
        ..Default::default()
    }));
    let channels = Arc::new(StaticChannelFactory::new());
    channels.register(1, stub1.clone());
    channels.register(2, stub2.clone());
    let channel = channels.get_channel(1, &store(1).address).await.unwrap();

    let mut client = RegionStoreClient::new(
        r1,
        channel,
        manager,
        channels,
        ScriptedLockResolver::new(vec![]),
        Config::default(),
    );

    // No budget at all: a store-not-match rebind must not consume backoff.
    let mut bo = BackOffer::new(Backoff::no_backoff(), Backoff::no_backoff(), Backoff::no_backoff());
    let value = client.get(&mut bo, "ka".into(), 100).await.unwrap();

    assert_eq!(value, b"v".to_vec());
    assert_eq!(stub1.call_count("get"), 1);
    assert_eq!(stub2.call_count("get"), 1);
}
