use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use shelfcache::{EvictionPolicy, L1Cache, L1Config};

fn populated(capacity: usize, policy: EvictionPolicy) -> (L1Cache<Vec<u8>>, Vec<String>) {
    let cache = L1Cache::new(
        L1Config::default()
            .with_max_entries(capacity)
            .with_policy(policy),
    );
    let data = vec![b'x'; 1024];

    let keys: Vec<String> = (0..100).map(|i| format!("book_{i}_details")).collect();
    for key in &keys {
        cache.set(key.clone(), data.clone(), None);
    }
    (cache, keys)
}

fn bench_cached_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("cached_get");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_1kb_cached", |b| {
        let (cache, keys) = populated(1000, EvictionPolicy::Adaptive);

        let mut counter = 0;
        b.iter(|| {
            black_box(cache.get(&keys[counter % 100]));
            counter += 1;
        });
    });

    group.finish();
}

fn bench_mixed_50_50(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    group.bench_function("50_read_50_write_cached", |b| {
        let (cache, keys) = populated(1000, EvictionPolicy::Adaptive);
        let data = vec![b'x'; 1024];

        let mut counter = 0usize;
        b.iter(|| {
            let key = &keys[counter % 100];
            if counter % 2 == 0 {
                black_box(cache.get(key));
            } else {
                black_box(cache.set(key.clone(), data.clone(), None));
            }
            counter += 1;
        });
    });

    group.finish();
}

fn bench_eviction_pressure(c: &mut Criterion) {
    let mut group = c.benchmark_group("eviction");
    group.sample_size(30);
    group.throughput(Throughput::Elements(1));

    for policy in [EvictionPolicy::Lru, EvictionPolicy::Adaptive] {
        group.bench_function(format!("insert_full_{policy}"), |b| {
            let (cache, _) = populated(100, policy);
            let data = vec![b'x'; 1024];

            let mut counter = 0u64;
            b.iter(|| {
                // Every insert is a new key, so every insert evicts
                black_box(cache.set(format!("new_{counter}"), data.clone(), None));
                counter += 1;
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_cached_get,
    bench_mixed_50_50,
    bench_eviction_pressure
);
criterion_main!(benches);
