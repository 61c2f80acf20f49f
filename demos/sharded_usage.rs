//! Sharded Cache Usage
//!
//! Shares a `ShardedCache` between worker threads running a read-heavy
//! workload and reports throughput and hit rate.
//!
//! Run with: cargo run --release --example sharded_usage

use promocache::config::ShardedCacheConfig;
use promocache::{CacheMetrics, ShardedCache};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const THREADS: u64 = 8;
const OPS_PER_THREAD: u64 = 200_000;
const KEYS: u64 = 50_000;

fn main() {
    let config = ShardedCacheConfig::new(16, NonZeroUsize::new(2_048).unwrap());
    let cache: Arc<ShardedCache<u64, String>> = Arc::new(ShardedCache::init(config, None));
    println!(
        "{} shards, {} slots in total\n",
        cache.shard_count(),
        cache.capacity()
    );

    let start = Instant::now();
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                let mut state = t.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
                for i in 0..OPS_PER_THREAD {
                    // xorshift keeps the demo free of extra dependencies
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    let key = (state % KEYS).min(state % (KEYS / 10));
                    if i % 10 == 0 {
                        cache.set(key, format!("value-{key}"), Duration::from_secs(30));
                    } else {
                        cache.get_with(&key, |value, _| value.len());
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let elapsed = start.elapsed();

    let total_ops = THREADS * OPS_PER_THREAD;
    println!(
        "{total_ops} operations in {elapsed:?} ({:.0} ops/s)",
        total_ops as f64 / elapsed.as_secs_f64()
    );

    let stats = cache.stats();
    println!("hit rate:       {:.1}%", stats.hit_rate() * 100.0);
    println!("entries:        {}", cache.len());
    println!("flushes:        {}", stats.flushes);
    println!(
        "promotions:     {} recorded, {} applied after dedup",
        stats.promotions_recorded, stats.promotions_applied
    );

    // Batched lookups fan out per shard and come back in input order
    let keys: Vec<u64> = (0..8).collect();
    let found = cache.mget(keys.iter());
    for (key, hit) in keys.iter().zip(found) {
        println!("  {key}: {:?}", hit.map(|hit| hit.value));
    }

    println!("\n{} metrics: {:?}", cache.algorithm_name(), cache.metrics());
}
