//! Basic Cache Usage
//!
//! Walks through set/get, expiry, eviction order and batch operations on a
//! single `Cache`, printing the metrics at the end.
//!
//! Run with: cargo run --example basic_usage

use promocache::config::CacheConfig;
use promocache::{Cache, CacheMetrics, Presence};
use std::num::NonZeroUsize;
use std::thread;
use std::time::Duration;

fn main() {
    println!("promocache basic usage");
    println!("======================\n");

    let config = CacheConfig {
        capacity: NonZeroUsize::new(3).unwrap(),
        promotion_buffer: 64,
    };
    let cache: Cache<&str, u32> = Cache::init(config, None);

    // Eviction follows recency
    cache.set("a", 1, Duration::ZERO);
    cache.set("b", 2, Duration::ZERO);
    cache.set("c", 3, Duration::ZERO);
    cache.get(&"a");
    cache.flush_promotions();
    cache.set("d", 4, Duration::ZERO);
    println!("after reading a and inserting d:");
    for key in ["a", "b", "c", "d"] {
        println!("  {key}: {:?}", cache.get_quiet(&key).map(|hit| hit.value));
    }

    // Expiry is reported, not enforced
    cache.set("session", 42, Duration::from_millis(10));
    println!("\nsession ttl: {:?}", cache.get_with_ttl(&"session"));
    thread::sleep(Duration::from_millis(20));
    println!("session after 20ms: {:?}", cache.get(&"session"));
    println!("  not stale: {:?}", cache.get_not_stale(&"session"));
    match cache.has(&"session") {
        Presence::Expired => println!("  has: expired, slot still occupied"),
        other => println!("  has: {other:?}"),
    }

    // Batch operations
    cache.mset([("x", 10), ("y", 20)], Duration::from_secs(60));
    let found = cache.mget(["x", "missing", "y"].iter());
    println!("\nmget x, missing, y: {found:?}");
    println!("mdelete x, y: {} removed", cache.mdelete(["x", "y"].iter()));

    println!("\n{} metrics:", cache.algorithm_name());
    for (name, value) in cache.metrics() {
        println!("  {name:<22} {value}");
    }
}
