//! Performance benchmarks for the object store.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use modal_store::{
    ClientConfig, InsertValue, ObjectClient, RawBytes, RawFieldSpec, RawObjectSpec, RawSchema,
    SchemaRegistry, TransferMethod, TypeName,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn video_schema() -> SchemaRegistry {
    SchemaRegistry::parse(
        RawSchema::new().object(
            "Video",
            RawObjectSpec::new()
                .field("summary", RawFieldSpec::memory())
                .field(
                    "thumbnail",
                    RawFieldSpec::disk(Arc::new(RawBytes)).with_save(Arc::new(RawBytes)),
                ),
        ),
    )
    .unwrap()
}

fn open_client(dir: &TempDir) -> ObjectClient {
    ObjectClient::open(
        ClientConfig {
            root: dir.path().join("data"),
            create_if_missing: true,
        },
        Some(video_schema()),
    )
    .unwrap()
}

fn video() -> TypeName {
    TypeName::new("Video").unwrap()
}

/// Benchmark document-only inserts.
fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    group.bench_function("memory_fields", |b| {
        let dir = TempDir::new().unwrap();
        let client = open_client(&dir);
        let mut i = 0u64;

        b.iter(|| {
            i += 1;
            let mut values = BTreeMap::new();
            values.insert("summary".to_string(), InsertValue::Inline(json!("summary")));
            black_box(
                client
                    .insert(&video(), &format!("v{}", i), values, None, TransferMethod::Copy)
                    .unwrap(),
            );
        });
    });

    group.finish();
}

/// Benchmark lazy loads of disk payloads with varying sizes.
fn bench_lazy_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("lazy_get");

    for size_kb in [1usize, 64, 1024] {
        group.bench_with_input(
            BenchmarkId::new("payload_kb", size_kb),
            &size_kb,
            |b, &size_kb| {
                let dir = TempDir::new().unwrap();
                let client = open_client(&dir);

                let src = dir.path().join("thumb.bin");
                fs::write(&src, vec![0u8; size_kb * 1024]).unwrap();

                let mut values = BTreeMap::new();
                values.insert("thumbnail".to_string(), InsertValue::Source(src));
                client
                    .insert(&video(), "v1", values, None, TransferMethod::Copy)
                    .unwrap();

                b.iter(|| {
                    // fresh wrapper each round so the first-access load is measured
                    let v1 = client.get(&video(), "v1").unwrap();
                    black_box(v1.get("thumbnail").unwrap());
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_insert, bench_lazy_get);
criterion_main!(benches);
