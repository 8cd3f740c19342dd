//! Example: cache operations against a Redis Cluster.
//!
//! Requirements:
//! - Redis Cluster running on localhost (ports 7000-7005)
//! - Optional `config/redis.<MYENV>.ini`, otherwise the seeds below are used
//!
//! Quick setup with Docker:
//! ```bash
//! docker run -d --name redis-cluster -p 7000-7005:7000-7005 \
//!   grokzen/redis-cluster:latest
//! ```
//!
//! Run:
//! ```bash
//! RUST_LOG=slotcache=debug cargo run --example cluster
//! ```

use std::time::Duration;

use slotcache::{load_module_config, ClusterBuilder, ClusterConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> slotcache::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== slotcache Redis Cluster Example ===\n");

    // Load config/redis.<env>.ini when present
    println!("1. Connecting to Redis Cluster...");
    let builder = match load_module_config::<ClusterConfig, _>("redis", &["config", "."]) {
        Ok(config) => {
            println!("   Using config file, seed {}", config.host);
            ClusterBuilder::from_config(config)
        }
        Err(e) => {
            println!("   {}; falling back to local seeds", e);
            ClusterBuilder::new()
                .host("127.0.0.1:7000,127.0.0.1:7001,127.0.0.1:7002")
                .read_timeout(Duration::from_secs(1))
                .retry(3, Duration::from_millis(100))
        }
    };
    let cluster = builder.build().await?;

    println!("\n2. Checking cluster topology...");
    println!("   Cluster nodes: {}", cluster.node_count().await);
    println!("   Slot ranges: {}", cluster.slot_range_count().await);
    println!("   All slots covered: {}", cluster.is_fully_covered().await);

    println!("\n3. Strings with TTL...");
    cluster.setex("user:1000:name", "Alice", 60).await?;
    println!("   GET user:1000:name = {:?}", cluster.get("user:1000:name").await?);
    cluster.del("user:1000:name").await?;
    println!(
        "   GET after DEL = {:?}",
        cluster.get("user:1000:name").await?
    );

    println!("\n4. Hashes...");
    cluster.hset("user:1000:profile", "email", "alice@example.com", 0).await?;
    cluster
        .hmset(
            "user:1000:profile",
            300,
            [("city", "Hanoi"), ("lang", "rust")],
        )
        .await?;
    let values = cluster
        .hmget("user:1000:profile", &["email", "missing", "lang"])
        .await?;
    println!("   HMGET = {:?}", values);
    println!(
        "   HGET city = {:?}",
        cluster.hget("user:1000:profile", "city").await?
    );

    println!("\n5. Pool status...");
    println!("{}", cluster.status().await?);

    cluster.close().await;
    println!("\n=== Example completed successfully! ===");
    Ok(())
}
