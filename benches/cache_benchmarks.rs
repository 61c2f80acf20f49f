//! Criterion benchmarks for single-threaded operations and multi-threaded
//! read-heavy workloads

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use promocache::config::{CacheConfig, ShardedCacheConfig};
use promocache::{Cache, ShardedCache};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// Benchmark configuration
const CACHE_SIZE: usize = 10_000;
const NUM_OPERATIONS: usize = 10_000;
const TTL: Duration = Duration::from_secs(60);

fn make_cache(cap: usize, promotion_buffer: usize) -> Cache<usize, usize> {
    let config = CacheConfig {
        capacity: NonZeroUsize::new(cap).unwrap(),
        promotion_buffer,
    };
    Cache::init(config, None)
}

fn make_sharded(shards: usize, cap: usize) -> ShardedCache<usize, usize> {
    let config = ShardedCacheConfig::new(shards, NonZeroUsize::new(cap / shards).unwrap());
    ShardedCache::init(config, None)
}

// Simple linear congruential generator for reproducible benchmarks
struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_mul(1103515245).wrapping_add(12345) & 0x7fffffff;
        self.state
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() as f64) / (0x7fffffff as f64)
    }
}

// Zipf-like key distribution over `n` keys
fn zipf_sample(n: usize, skew: f64, seed: u64) -> Vec<usize> {
    let mut rng = SimpleRng::new(seed);

    let norm: f64 = (1..=n).map(|i| 1.0 / (i as f64).powf(skew)).sum();

    let mut samples = Vec::with_capacity(NUM_OPERATIONS);
    for _ in 0..NUM_OPERATIONS {
        let u: f64 = rng.next_f64();
        let mut sum: f64 = 0.0;
        let mut sample: usize = 1;

        while sample <= n {
            sum += 1.0 / (sample as f64).powf(skew) / norm;
            if sum >= u {
                break;
            }
            sample += 1;
        }

        samples.push(sample.saturating_sub(1) % n);
    }

    samples
}

fn benchmark_single_thread(c: &mut Criterion) {
    let samples = zipf_sample(CACHE_SIZE * 2, 0.8, 42);
    let mut group = c.benchmark_group("Single Thread");

    let cache = make_cache(CACHE_SIZE, 1024);
    for i in 0..CACHE_SIZE {
        cache.set(i, i, TTL);
    }

    group.bench_function("get hit", |b| {
        b.iter(|| {
            for i in 0..NUM_OPERATIONS {
                black_box(cache.get(&(i % CACHE_SIZE)));
            }
        });
    });

    group.bench_function("get_quiet hit", |b| {
        b.iter(|| {
            for i in 0..NUM_OPERATIONS {
                black_box(cache.get_quiet(&(i % CACHE_SIZE)));
            }
        });
    });

    group.bench_function("set existing", |b| {
        b.iter(|| {
            for i in 0..NUM_OPERATIONS {
                cache.set(i % CACHE_SIZE, i, TTL);
            }
        });
    });

    group.bench_function("mixed zipf 75/25", |b| {
        b.iter(|| {
            let cache = make_cache(CACHE_SIZE, 1024);
            for &key in &samples {
                if key % 4 == 0 {
                    cache.set(key, key, TTL);
                } else {
                    black_box(cache.get(&key));
                }
            }
        });
    });

    let keys: Vec<usize> = (0..64).map(|i| i * 97 % CACHE_SIZE).collect();
    group.bench_function("mget 64", |b| {
        b.iter(|| black_box(cache.mget(keys.iter())));
    });

    group.finish();
}

fn benchmark_promotion_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("Promotion Buffer Size");

    for buffer in [16, 256, 1024, 8192] {
        let cache = make_cache(CACHE_SIZE, buffer);
        for i in 0..CACHE_SIZE {
            cache.set(i, i, TTL);
        }
        group.bench_with_input(BenchmarkId::from_parameter(buffer), &cache, |b, cache| {
            b.iter(|| {
                for i in 0..NUM_OPERATIONS {
                    black_box(cache.get(&(i * 7 % CACHE_SIZE)));
                }
            });
        });
    }

    group.finish();
}

// Spawns one thread per sample set and feeds every (position, key) to `op`
fn run_read_heavy<F>(samples: &Arc<Vec<Vec<usize>>>, threads: usize, op: F)
where
    F: Fn(usize, usize) + Send + Sync + 'static,
{
    let op = Arc::new(op);
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let op = Arc::clone(&op);
            let samples = Arc::clone(samples);
            thread::spawn(move || {
                for (i, &key) in samples[t].iter().enumerate() {
                    op(i, key);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

fn benchmark_multi_thread(c: &mut Criterion) {
    let samples: Arc<Vec<Vec<usize>>> = Arc::new(
        (0..8)
            .map(|t| zipf_sample(CACHE_SIZE, 1.0, t + 1))
            .collect(),
    );
    let mut group = c.benchmark_group("Read Heavy");
    group.sample_size(10);

    for threads in [1, 4, 8] {
        let cache = Arc::new(make_cache(CACHE_SIZE, 1024));
        group.bench_with_input(BenchmarkId::new("Cache", threads), &threads, |b, &threads| {
            b.iter(|| {
                let cache = Arc::clone(&cache);
                run_read_heavy(&samples, threads, move |i, key| {
                    if i % 16 == 0 {
                        cache.set(key, i, TTL);
                    } else {
                        black_box(cache.get(&key));
                    }
                });
            });
        });

        let sharded = Arc::new(make_sharded(16, CACHE_SIZE));
        group.bench_with_input(
            BenchmarkId::new("ShardedCache", threads),
            &threads,
            |b, &threads| {
                b.iter(|| {
                    let sharded = Arc::clone(&sharded);
                    run_read_heavy(&samples, threads, move |i, key| {
                        if i % 16 == 0 {
                            sharded.set(key, i, TTL);
                        } else {
                            black_box(sharded.get(&key));
                        }
                    });
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_single_thread,
    benchmark_promotion_buffer,
    benchmark_multi_thread
);
criterion_main!(benches);
