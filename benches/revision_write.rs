//! Revision write-path benchmarks.
//!
//! Measures the cost of the full `ProjectStore::write_revision` protocol
//! (stage body -> commit row -> finalize rename) under the v2 fanout layout,
//! and `get_or_create`'s normalize+probe path on an already-populated
//! project, since those are the two operations called once per discovered
//! link during a crawl.
//!
//! Run with: cargo bench --features service

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use tempfile::TempDir;

use crystal_core::entity::model::GetOrCreateOutcome;
use crystal_core::entity::resource::ResponseMetadata;
use crystal_core::{OpenOptions, ProjectStore};

async fn open_store() -> (TempDir, ProjectStore) {
    let dir = TempDir::new().unwrap();
    let project_dir = dir.path().join("bench.crystalproj");
    let store = ProjectStore::open(&project_dir, OpenOptions::default())
        .await
        .unwrap();
    (dir, store)
}

fn bench_write_revision(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let body = vec![b'x'; 8 * 1024];

    c.bench_function("write_revision_8kb_body", |b| {
        b.to_async(&rt).iter_batched(
            || {
                rt.block_on(async {
                    let (dir, store) = open_store().await;
                    let id = match store
                        .get_or_create("http://bench.example.com/page")
                        .await
                        .unwrap()
                    {
                        GetOrCreateOutcome::Resource { id, .. } => id,
                        _ => unreachable!(),
                    };
                    (dir, store, id)
                })
            },
            |(dir, store, id)| {
                let body = body.clone();
                async move {
                    let metadata = ResponseMetadata {
                        http_version: 11,
                        status_code: 200,
                        reason_phrase: "OK".to_string(),
                        headers: Vec::new(),
                    };
                    store
                        .write_revision(id, None, None, Some(&metadata), Some(&body))
                        .await
                        .unwrap();
                    drop(dir);
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_get_or_create_on_populated_project(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("get_or_create_1000_known_urls", |b| {
        b.to_async(&rt).iter_batched(
            || {
                rt.block_on(async {
                    let (dir, store) = open_store().await;
                    let urls: Vec<String> = (0..1000)
                        .map(|i| format!("http://bench.example.com/item/{i}"))
                        .collect();
                    store.bulk_get_or_create(&urls).await.unwrap();
                    (dir, store)
                })
            },
            |(dir, store)| async move {
                for i in 0..1000 {
                    let url = format!("http://bench.example.com/item/{i}");
                    store.get_or_create(&url).await.unwrap();
                }
                drop(dir);
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_write_revision,
    bench_get_or_create_on_populated_project
);
criterion_main!(benches);
