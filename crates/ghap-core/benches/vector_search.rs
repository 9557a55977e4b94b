use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ghap_core::{EmbeddingService, InMemoryVectorStore, MockEmbeddingService, VectorStore};

fn seed_collection(store: &dyn VectorStore, embeddings: &dyn EmbeddingService, n: usize) {
    store.create_collection("bench", embeddings.dim()).unwrap();
    for i in 0..n {
        let vector = embeddings.embed(&format!("observation number {i}")).unwrap();
        store
            .upsert("bench", &format!("id_{i}"), vector, serde_json::json!({"i": i}))
            .unwrap();
    }
}

fn bench_search(c: &mut Criterion) {
    let embeddings = MockEmbeddingService::new(768);
    let store = InMemoryVectorStore::new();
    seed_collection(&store, &embeddings, 2_000);
    let query = embeddings.embed("observation number 1").unwrap();

    c.bench_function("in_memory_search_2000_points", |b| {
        b.iter(|| store.search("bench", black_box(&query), black_box(10), None).unwrap())
    });
}

fn bench_upsert(c: &mut Criterion) {
    let embeddings = MockEmbeddingService::new(768);
    let store = InMemoryVectorStore::new();
    store.create_collection("bench_upsert", embeddings.dim()).unwrap();
    let vector = embeddings.embed("a steady observation").unwrap();

    c.bench_function("in_memory_upsert", |b| {
        b.iter(|| {
            store
                .upsert("bench_upsert", "id_fixed", black_box(vector.clone()), serde_json::json!({}))
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_search, bench_upsert);
criterion_main!(benches);
