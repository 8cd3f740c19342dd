//! Internal stress tests for concurrent use and retries.
//!
//! These run the public [`Cluster`] API against in-process mock nodes.

use std::time::Duration;

use tokio::time::Instant;

use crate::cluster::Cluster;
use crate::core::config::ClusterConfig;
use crate::testing::{Fault, MockNode};

fn config_for(node: &MockNode) -> ClusterConfig {
    ClusterConfig {
        host: node.address().to_string(),
        ..ClusterConfig::default()
    }
}

#[tokio::test]
async fn test_concurrent_hset_hget_pairs() {
    let nodes = MockNode::start_cluster(3).await;
    let cluster = Cluster::initialize(config_for(&nodes[0])).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..50 {
        let cluster = cluster.clone();
        handles.push(tokio::spawn(async move {
            let key = format!("user:{}", i);
            let value = format!("value-{}", i);
            cluster.hset(&key, "field", &value, 0).await.unwrap();
            assert_eq!(cluster.hget(&key, "field").await.unwrap(), value);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = cluster.pool_stats().await;
    assert_eq!(stats.len(), 3);
    assert!(stats.values().all(|s| s.active == 0));
}

#[tokio::test]
async fn test_mixed_operations_share_small_pool() {
    let node = MockNode::start().await;
    let cluster = Cluster::initialize(ClusterConfig {
        max_active: 2,
        max_idle: 2,
        ..config_for(&node)
    })
    .await
    .unwrap();

    let mut handles = Vec::new();
    for i in 0..100 {
        let cluster = cluster.clone();
        handles.push(tokio::spawn(async move {
            let key = format!("k{}", i);
            match i % 3 {
                0 => {
                    cluster.setex(&key, "v", 10).await.unwrap();
                    assert_eq!(cluster.get(&key).await.unwrap(), "v");
                }
                1 => {
                    cluster.hmset(&key, 10, [("a", "1"), ("b", "2")]).await.unwrap();
                    assert_eq!(cluster.hmget(&key, &["b", "a"]).await.unwrap(), vec!["2", "1"]);
                }
                _ => {
                    cluster.del(&key).await.unwrap();
                    assert_eq!(cluster.get(&key).await.unwrap(), "");
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = cluster.pool_stats().await;
    assert_eq!(stats[node.address()].active, 0);
    assert!(stats[node.address()].idle <= 2);
}

#[tokio::test]
async fn test_retries_sleep_once_per_retry() {
    let node = MockNode::start().await;
    let cluster = Cluster::initialize(ClusterConfig {
        retry_count: 3,
        retry_delay_ms: 100,
        ..config_for(&node)
    })
    .await
    .unwrap();
    for _ in 0..3 {
        node.push_fault(Fault::Disconnect);
    }

    let started = Instant::now();
    cluster.setex("k", "v", 0).await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(300), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(3), "elapsed {:?}", elapsed);
    assert_eq!(node.command_count("SET"), 4);
    assert_eq!(node.string("k").as_deref(), Some("v"));
}

#[tokio::test]
async fn test_exhausted_retries_surface_connection_error() {
    let node = MockNode::start().await;
    let cluster = Cluster::initialize(ClusterConfig {
        retry_count: 2,
        retry_delay_ms: 10,
        ..config_for(&node)
    })
    .await
    .unwrap();
    for _ in 0..3 {
        node.push_fault(Fault::Disconnect);
    }

    let err = cluster.get("k").await.unwrap_err();
    assert!(err.is_connection_error(), "got {:?}", err);
    assert_eq!(node.command_count("GET"), 3);

    // the pool recovers once the node behaves again
    assert_eq!(cluster.get("k").await.unwrap(), "");
}

#[tokio::test]
async fn test_retry_with_single_connection_pool() {
    let node = MockNode::start().await;
    let cluster = Cluster::initialize(ClusterConfig {
        max_active: 1,
        retry_count: 2,
        retry_delay_ms: 0,
        ..config_for(&node)
    })
    .await
    .unwrap();
    node.push_fault(Fault::Disconnect);
    node.push_fault(Fault::Disconnect);

    // the retry releases its lease before refreshing through the same pool
    tokio::time::timeout(Duration::from_secs(5), cluster.hset("h", "f", "v", 0))
        .await
        .expect("retry deadlocked")
        .unwrap();
    assert_eq!(node.hash_field("h", "f").as_deref(), Some("v"));
}
