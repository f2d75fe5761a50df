//! Connection cache benchmarks for keystone-tenancy

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use keystone_tenancy::testing::StubConnectionFactory;
use keystone_tenancy::{ConnectionCache, StoreNaming};
use std::hint::black_box;
use std::sync::Arc;

fn cache_hit_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let cache = Arc::new(ConnectionCache::new(StubConnectionFactory::new()));

    // Pre-populate cache
    rt.block_on(async {
        cache.get_or_create("tenant_acme").await.unwrap();
    });

    let mut group = c.benchmark_group("cache_hit");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_or_create_cached", |b| {
        b.to_async(&rt).iter(|| async {
            let handle = cache.get_or_create(black_box("tenant_acme")).await.unwrap();
            black_box(handle);
        });
    });

    group.finish();
}

fn cache_hit_many_tenants_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("cache_hit_many_tenants");

    for tenants in [10usize, 100, 1_000] {
        let cache = Arc::new(ConnectionCache::new(StubConnectionFactory::new()));
        let names: Vec<String> = (0..tenants).map(|i| format!("tenant_{}", i)).collect();
        rt.block_on(async {
            for name in &names {
                cache.get_or_create(name).await.unwrap();
            }
        });

        group.throughput(Throughput::Elements(tenants as u64));
        group.bench_with_input(BenchmarkId::from_parameter(tenants), &names, |b, names| {
            b.to_async(&rt).iter(|| async {
                for name in names {
                    black_box(cache.get_or_create(name).await.unwrap());
                }
            });
        });
    }

    group.finish();
}

fn store_naming_benchmark(c: &mut Criterion) {
    let naming = StoreNaming::default();

    let mut group = c.benchmark_group("store_naming");
    group.throughput(Throughput::Elements(1));

    group.bench_function("store_name", |b| {
        b.iter(|| naming.store_name(black_box("Acme-Corp")).unwrap());
    });

    group.finish();
}

criterion_group!(
    benches,
    cache_hit_benchmark,
    cache_hit_many_tenants_benchmark,
    store_naming_benchmark
);
criterion_main!(benches);
