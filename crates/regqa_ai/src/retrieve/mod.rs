use std::sync::Arc;

use regqa_core::domain::ChunkMetadata;
use regqa_core::error::{codes, AppError};
use serde::Serialize;

use crate::index::EmbeddingIndex;

pub const SECTION_SEPARATOR: &str = "\n\n---SECTION---\n\n";
pub const MAX_K: usize = 50;

/// Ranked retrieval result; all vectors are parallel and ordered by ascending distance.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Retrieval {
    pub context: String,
    pub documents: Vec<String>,
    pub metadatas: Vec<ChunkMetadata>,
    pub distances: Vec<f32>,
}

impl Retrieval {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[derive(Clone)]
pub struct RetrievalEngine {
    index: Arc<EmbeddingIndex>,
}

impl RetrievalEngine {
    pub fn new(index: Arc<EmbeddingIndex>) -> Self {
        Self { index }
    }

    pub fn retrieve(&self, question: &str, k: usize) -> Result<Retrieval, AppError> {
        let q = question.trim();
        if q.is_empty() {
            return Err(AppError::new(
                codes::RETRIEVAL_EMPTY_QUESTION,
                "Question must not be empty",
            ));
        }
        if k == 0 {
            return Ok(Retrieval::default());
        }
        let k = k.min(MAX_K);

        let hits = self.index.search(q, k)?;

        let mut out = Retrieval::default();
        for hit in hits {
            out.documents.push(hit.text);
            out.metadatas.push(hit.metadata);
            out.distances.push(hit.distance);
        }
        out.context = out.documents.join(SECTION_SEPARATOR);

        tracing::debug!(
            k,
            hits = out.len(),
            best = ?out.distances.first(),
            context_chars = out.context.chars().count(),
            "retrieved context"
        );
        Ok(out)
    }
}
