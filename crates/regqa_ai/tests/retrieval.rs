use std::sync::Arc;

use pretty_assertions::assert_eq;
use regqa_ai::embeddings::Embedder;
use regqa_ai::index::{DistanceMetric, EmbeddingIndex, SqliteVectorIndex};
use regqa_ai::retrieve::{RetrievalEngine, SECTION_SEPARATOR};
use regqa_core::domain::Chunk;
use regqa_core::error::{codes, AppError};

/// Embeds text as `[count('a'), count('b'), 1]`.
struct CountABEmbedder;

impl Embedder for CountABEmbedder {
    fn embed(&self, _model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        Ok(inputs
            .iter()
            .map(|s| {
                let a = s.chars().filter(|c| *c == 'a').count() as f32;
                let b = s.chars().filter(|c| *c == 'b').count() as f32;
                vec![a, b, 1.0]
            })
            .collect())
    }
}

fn engine(metric: DistanceMetric) -> RetrievalEngine {
    let (store, _) = SqliteVectorIndex::open_in_memory("c", metric).expect("open");
    let index = EmbeddingIndex::new(Box::new(store), Arc::new(CountABEmbedder), "ab", 32);
    let chunks = vec![
        Chunk::new("1", "A", "1", "a".repeat(40)),
        Chunk::new("1", "A", "2", format!("{}{}", "a".repeat(30), "b".repeat(10))),
        Chunk::new("2", "B", "1", "b".repeat(40)),
        Chunk::new("2", "B", "2", format!("{}{}", "b".repeat(30), "a".repeat(10))),
        Chunk::new("3", "Mixed", "1", format!("{}{}", "a".repeat(20), "b".repeat(20))),
    ];
    index.build(&chunks, false).expect("build");
    RetrievalEngine::new(Arc::new(index))
}

#[test]
fn returns_at_most_k_with_non_decreasing_distance() {
    for metric in [DistanceMetric::Cosine, DistanceMetric::L2, DistanceMetric::Ip] {
        let engine = engine(metric);
        for k in 1..=6 {
            let r = engine.retrieve("aaaa", k).expect("retrieve");
            assert!(r.len() <= k, "metric={metric:?} k={k}");
            assert_eq!(r.documents.len(), r.metadatas.len());
            assert_eq!(r.documents.len(), r.distances.len());
            assert!(r.distances.windows(2).all(|w| w[0] <= w[1]), "metric={metric:?}");
        }
    }
}

#[test]
fn ranks_nearest_first_and_joins_context() {
    let engine = engine(DistanceMetric::Cosine);
    let r = engine.retrieve("aaaaaaaa", 2).expect("retrieve");
    assert_eq!(r.metadatas[0].chunk_id, "1.1");
    assert_eq!(r.metadatas[1].chunk_id, "1.2");
    assert_eq!(r.metadatas[0].article_title, "A");
    assert_eq!(r.context, r.documents.join(SECTION_SEPARATOR));
    assert!(r.context.contains("\n\n---SECTION---\n\n"));
}

#[test]
fn zero_k_is_empty_and_large_k_is_capped() {
    let engine = engine(DistanceMetric::Cosine);
    let none = engine.retrieve("a", 0).expect("k=0");
    assert!(none.is_empty());
    assert_eq!(none.context, "");
    assert_eq!(engine.retrieve("a", 500).expect("k=500").len(), 5);

    let err = engine.retrieve("   ", 3).expect_err("blank");
    assert_eq!(err.code, codes::RETRIEVAL_EMPTY_QUESTION);
}
