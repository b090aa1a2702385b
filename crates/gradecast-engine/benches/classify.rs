use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tokio::runtime::Runtime;

use gradecast_core::memory::{MemoryStore, SimilarityTable, StubElement};
use gradecast_core::traits::ModelElement;
use gradecast_engine::similarity::SimilarityIndex;

fn index() -> SimilarityIndex {
    SimilarityIndex::new(
        0.8,
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryStore::new()),
    )
}

fn elements(count: usize, table: &Arc<SimilarityTable>) -> Vec<Arc<dyn ModelElement>> {
    (0..count)
        .map(|n| {
            Arc::new(StubElement::new(format!("element-{n}"), "class", Arc::clone(table)))
                as Arc<dyn ModelElement>
        })
        .collect()
}

fn bench_classify(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("classify");

    // Worst case: nothing matches, every element founds a new class and
    // each insertion scans the full representative set.
    group.bench_function("all_novel_100", |b| {
        let table = Arc::new(SimilarityTable::new());
        let elements = elements(100, &table);
        b.iter(|| {
            rt.block_on(async {
                let index = index();
                for (n, element) in elements.iter().enumerate() {
                    black_box(index.classify(element, n as u64).await.unwrap());
                }
            })
        })
    });

    // Everything collapses into the first class: a single representative
    // is scanned per insertion.
    group.bench_function("all_matching_100", |b| {
        let table = Arc::new(SimilarityTable::new());
        for n in 1..100 {
            table.set("element-0", format!("element-{n}"), 0.95);
        }
        let elements = elements(100, &table);
        b.iter(|| {
            rt.block_on(async {
                let index = index();
                for (n, element) in elements.iter().enumerate() {
                    black_box(index.classify(element, n as u64).await.unwrap());
                }
            })
        })
    });

    group.finish();
}

criterion_group!(benches, bench_classify);
criterion_main!(benches);
