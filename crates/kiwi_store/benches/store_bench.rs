//! Benchmarks for kiwi_store
//!
//! Run with: cargo bench -p kiwi_store

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kiwi_store::query::{Pattern, PatternQuery, PatternTerm};
use kiwi_store::{vocab, KiWiConfiguration, KiWiStore};
use tempfile::TempDir;

fn open() -> (TempDir, KiWiStore) {
    let dir = TempDir::new().unwrap();
    let store = KiWiStore::open(KiWiConfiguration::sqlite(dir.path().join("bench.db"))).unwrap();
    (dir, store)
}

fn load(store: &KiWiStore, size: usize) {
    let mut txn = store.begin().unwrap();
    let rdf_type = txn.create_uri(vocab::RDF_TYPE).unwrap();
    let person = txn.create_uri("http://example.org/Person").unwrap();
    let age = txn.create_uri("http://example.org/age").unwrap();
    for i in 0..size {
        let s = txn.create_uri(&format!("http://example.org/p{}", i)).unwrap();
        let o = txn.create_literal((i % 90) as i64).unwrap();
        txn.add_statement(&s, &rdf_type, &person, None).unwrap();
        txn.add_statement(&s, &age, &o, None).unwrap();
    }
    txn.commit().unwrap();
}

fn bench_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_statement");
    group.sample_size(10);

    for size in [100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("sqlite", size), size, |b, &size| {
            b.iter(|| {
                let (_dir, store) = open();
                load(&store, black_box(size));
            });
        });
    }

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let (_dir, store) = open();
    load(&store, 1000);

    let mut group = c.benchmark_group("lookup");

    group.bench_function("create_uri_cached", |b| {
        let mut txn = store.begin().unwrap();
        b.iter(|| txn.create_uri(black_box("http://example.org/p500")).unwrap());
    });

    group.bench_function("create_uri_uncached", |b| {
        let mut txn = store.begin().unwrap();
        b.iter(|| {
            store.caches().clear();
            txn.create_uri(black_box("http://example.org/p500")).unwrap()
        });
    });

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let (_dir, store) = open();
    load(&store, 1000);

    let query = PatternQuery::new(vec![
        Pattern::new(
            PatternTerm::var("x"),
            kiwi_store::Node::uri(vocab::RDF_TYPE),
            kiwi_store::Node::uri("http://example.org/Person"),
        ),
        Pattern::new(
            PatternTerm::var("x"),
            kiwi_store::Node::uri("http://example.org/age"),
            PatternTerm::var("age"),
        ),
    ])
    .order_by("age")
    .limit(50);

    let mut group = c.benchmark_group("query");
    group.bench_function("join_order_by", |b| {
        let mut txn = store.begin().unwrap();
        b.iter(|| txn.query(black_box(&query)).unwrap().count());
    });
    group.finish();
}

criterion_group!(benches, bench_add, bench_lookup, bench_query);
criterion_main!(benches);
