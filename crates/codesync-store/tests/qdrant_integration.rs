//! Runs against a real Qdrant container; needs a Docker daemon.
//! `cargo test -p codesync-store -- --ignored`

use codesync_store::{
    FileMetadata, HybridVector, IndexedRecord, PayloadFilter, QdrantStore, QueryOptions,
    RecordPayload, SparseVector, VectorStore,
};
use testcontainers::ContainerAsync;
use testcontainers::GenericImage;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;

const QDRANT_GRPC_PORT: ContainerPort = ContainerPort::Tcp(6334);

fn qdrant_image() -> GenericImage {
    GenericImage::new("qdrant/qdrant", "v1.16.0")
        .with_wait_for(WaitFor::message_on_stdout("gRPC listening"))
        .with_exposed_port(QDRANT_GRPC_PORT)
}

async fn setup() -> (QdrantStore, ContainerAsync<GenericImage>) {
    let container = qdrant_image().start().await.unwrap();
    let grpc_port = container.get_host_port_ipv4(6334).await.unwrap();
    let url = format!("http://127.0.0.1:{grpc_port}");
    (QdrantStore::new(&url, 4).unwrap(), container)
}

fn record(id: &str, file: &str, dense: [f32; 4], code: &str) -> IndexedRecord {
    IndexedRecord {
        id: id.into(),
        vector: HybridVector {
            dense: dense.to_vec(),
            sparse: codesync_embed::embed_sparse(code),
        },
        payload: RecordPayload {
            code_string: code.into(),
            metadata: FileMetadata {
                file_path: file.into(),
                file_name: file.rsplit('/').next().unwrap_or(file).into(),
                file_extension: "js".into(),
                file_size: 64,
                file_last_modified: 1_700_000_000_000,
                start_line: 1,
                end_line: 3,
            },
        },
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn clear_collection_recreates_empty() {
    let (store, _container) = setup().await;

    store.clear_collection("code").await.unwrap();
    assert!(store.collection_exists("code").await.unwrap());

    store
        .upsert(
            "code",
            vec![record(
                "6f1c2a44-0000-4000-8000-000000000001",
                "src/a.js",
                [0.1, 0.2, 0.3, 0.4],
                "function a() {}",
            )],
        )
        .await
        .unwrap();

    store.clear_collection("code").await.unwrap();
    let ids = store
        .find_ids_by_filter("code", &PayloadFilter::for_file("src/a.js"))
        .await
        .unwrap();
    assert!(ids.is_empty());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn hybrid_query_respects_file_filter() {
    let (store, _container) = setup().await;
    store.clear_collection("code").await.unwrap();

    store
        .upsert(
            "code",
            vec![
                record(
                    "6f1c2a44-0000-4000-8000-000000000001",
                    "a.js",
                    [0.9, 0.1, 0.0, 0.0],
                    "function parseConfig(text) { return JSON.parse(text); }",
                ),
                record(
                    "6f1c2a44-0000-4000-8000-000000000002",
                    "b.js",
                    [0.9, 0.1, 0.0, 0.0],
                    "function parseConfig(text) { return JSON.parse(text); }",
                ),
            ],
        )
        .await
        .unwrap();

    let hits = store
        .query(
            "code",
            HybridVector {
                dense: vec![0.9, 0.1, 0.0, 0.0],
                sparse: codesync_embed::embed_sparse("parseConfig"),
            },
            QueryOptions {
                limit: 5,
                filter: Some(PayloadFilter::for_file("a.js")),
                ..QueryOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].payload.as_ref().unwrap().metadata.file_path, "a.js");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn find_ids_pages_through_large_files() {
    let (store, _container) = setup().await;
    store.clear_collection("code").await.unwrap();

    let records: Vec<IndexedRecord> = (0..230)
        .map(|i| {
            record(
                &format!("6f1c2a44-0000-4000-8000-{i:012}"),
                "big.js",
                [0.1, 0.2, 0.3, 0.4],
                &format!("const value{i} = {i};"),
            )
        })
        .collect();
    store.upsert("code", records).await.unwrap();

    let ids = store
        .find_ids_by_filter("code", &PayloadFilter::for_file("big.js"))
        .await
        .unwrap();
    assert_eq!(ids.len(), 230);

    store.delete_by_ids("code", ids).await.unwrap();
    let remaining = store
        .find_ids_by_filter("code", &PayloadFilter::for_file("big.js"))
        .await
        .unwrap();
    assert!(remaining.is_empty());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn empty_sparse_vector_is_accepted() {
    let (store, _container) = setup().await;
    store.clear_collection("code").await.unwrap();

    let mut rec = record(
        "6f1c2a44-0000-4000-8000-000000000009",
        "c.js",
        [0.5, 0.5, 0.5, 0.5],
        "   ",
    );
    rec.vector.sparse = SparseVector::default();
    store.upsert("code", vec![rec]).await.unwrap();

    let ids = store
        .find_ids_by_filter("code", &PayloadFilter::for_file("c.js"))
        .await
        .unwrap();
    assert_eq!(ids.len(), 1);
}
