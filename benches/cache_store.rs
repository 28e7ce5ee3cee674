//! Benchmarks for the response cache
//!
//! This benchmark measures:
//! - Key derivation over growing documents
//! - Insert with LRU eviction at capacity
//! - Exact-hit lookup
//! - Similarity scan over a full store

use ai_lib_docproc::cache::{content_digest, CacheConfig, CacheKeyBuilder, CacheMetadata, CacheStore};
use ai_lib_docproc::types::SamplingParams;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::collections::BTreeMap;

fn document(chars: usize) -> String {
    "lorem ipsum dolor sit amet ".repeat(chars / 27 + 1)[..chars].to_string()
}

fn filled_store(n: usize) -> CacheStore {
    let store = CacheStore::new(
        CacheConfig::new()
            .with_max_entries(n)
            .with_auto_sweep_interval(std::time::Duration::ZERO),
    )
    .unwrap();
    for i in 0..n {
        let content = format!("document {}", i);
        store.set(
            &format!("key-{}", i),
            vec![0u8; 256],
            CacheMetadata::new("gpt-4o-mini", "openai").with_content_hash(content_digest(&content)),
            None,
        );
    }
    store
}

fn bench_key_building(c: &mut Criterion) {
    let builder = CacheKeyBuilder::new();
    let params = SamplingParams::new().temperature(0.2).max_tokens(512);
    let extra = BTreeMap::new();
    let mut group = c.benchmark_group("cache_key");
    for size in [1_000usize, 10_000, 100_000] {
        let doc = document(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("build_key", size), &doc, |b, doc| {
            b.iter(|| builder.build_key(black_box(doc), "gpt-4o", "openai", &params, &extra))
        });
    }
    group.finish();
}

fn bench_store_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_store");

    let store = filled_store(1_000);
    let mut i = 0usize;
    group.bench_function("set_at_capacity", |b| {
        b.iter(|| {
            i += 1;
            store.set(
                &format!("new-{}", i),
                vec![0u8; 256],
                CacheMetadata::new("gpt-4o-mini", "openai"),
                None,
            );
        })
    });

    let store = filled_store(1_000);
    group.bench_function("get_hit", |b| {
        b.iter(|| black_box(store.get(black_box("key-500"))))
    });

    let store = filled_store(1_000);
    group.bench_function("find_similar_scan", |b| {
        b.iter(|| {
            black_box(store.find_similar(
                black_box("document 999"),
                "gpt-4o-mini",
                "openai",
                0.99,
            ))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_key_building, bench_store_operations);
criterion_main!(benches);
