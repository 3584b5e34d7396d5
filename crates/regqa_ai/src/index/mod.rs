//! Nearest-neighbour index over chunk text.
//!
//! `EmbeddingIndex` owns the embedding collaborator and the model name, so building and
//! querying always share one embedding space. The collection header records that space
//! (model + dims) and queries against a differently-stamped collection are refused.
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use regqa_core::domain::Chunk;
use regqa_core::error::{codes, AppError};
use sha2::{Digest, Sha256};

use crate::embeddings::Embedder;

pub mod similarity;
pub mod sqlite;
pub mod vector;

pub use sqlite::SqliteVectorIndex;
pub use vector::{
    CollectionInfo, CollectionOpen, DistanceMetric, IndexEntry, IndexHit, IndexStamp, VectorIndex,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Collection already populated and no rebuild was forced.
    Skipped { count: u64 },
    Indexed { count: u64 },
}

impl BuildOutcome {
    pub fn count(&self) -> u64 {
        match self {
            BuildOutcome::Skipped { count } | BuildOutcome::Indexed { count } => *count,
        }
    }
}

/// sha256 over `id \0 text \n` for every chunk, in order.
pub fn chunk_set_fingerprint(chunks: &[Chunk]) -> String {
    let mut hasher = Sha256::new();
    for c in chunks {
        hasher.update(c.id.as_bytes());
        hasher.update([0u8]);
        hasher.update(c.text.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Storage ids equal logical ids; repeats within one batch become `"{id}~{n}"`, n = 2, 3, ...
pub fn assign_storage_ids(chunks: &[Chunk]) -> Vec<String> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut out = Vec::with_capacity(chunks.len());
    for c in chunks {
        let n = seen.entry(c.id.as_str()).or_insert(0);
        *n += 1;
        if *n == 1 {
            out.push(c.id.clone());
        } else {
            let storage_id = format!("{}~{}", c.id, n);
            tracing::warn!(chunk_id = %c.id, %storage_id, "duplicate chunk id disambiguated");
            out.push(storage_id);
        }
    }
    out
}

pub struct EmbeddingIndex {
    store: Box<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    model: String,
    batch_size: usize,
    gate: RwLock<()>,
}

impl EmbeddingIndex {
    pub fn new(
        store: Box<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        model: impl Into<String>,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            model: model.into(),
            batch_size: batch_size.max(1),
            gate: RwLock::new(()),
        }
    }

    fn read_gate(&self) -> Result<RwLockReadGuard<'_, ()>, AppError> {
        self.gate
            .read()
            .map_err(|_| AppError::new(codes::INDEX_UNAVAILABLE, "Index gate poisoned"))
    }

    fn write_gate(&self) -> Result<RwLockWriteGuard<'_, ()>, AppError> {
        self.gate
            .write()
            .map_err(|_| AppError::new(codes::INDEX_UNAVAILABLE, "Index gate poisoned"))
    }

    pub fn count(&self) -> Result<u64, AppError> {
        let _g = self.read_gate()?;
        self.store.count()
    }

    pub fn info(&self) -> Result<CollectionInfo, AppError> {
        let _g = self.read_gate()?;
        self.store.info()
    }

    /// Index `chunks` unless the collection is already populated (or `force` is set).
    pub fn build(&self, chunks: &[Chunk], force: bool) -> Result<BuildOutcome, AppError> {
        if chunks.is_empty() {
            return Err(AppError::new(
                codes::INDEX_NO_CHUNKS,
                "No chunks to index; parse the regulation first",
            ));
        }
        let fingerprint = chunk_set_fingerprint(chunks);

        if !force {
            let _g = self.read_gate()?;
            let info = self.store.info()?;
            if info.count > 0 {
                if info.chunk_set_sha256.as_deref() != Some(fingerprint.as_str())
                    || info.embedding_model.as_deref() != Some(self.model.as_str())
                {
                    tracing::warn!(
                        collection = %info.name,
                        stored_model = ?info.embedding_model,
                        model = %self.model,
                        "index is stale for the current chunks or model; rebuild with force"
                    );
                }
                tracing::info!(count = info.count, "index already populated; skipping build");
                return Ok(BuildOutcome::Skipped { count: info.count });
            }
        }

        // Embed outside the gate; only the swap is exclusive.
        let vectors = self.embed_chunks(chunks)?;
        let dims = vectors.first().map(|v| v.len()).unwrap_or(0);
        if dims == 0 {
            return Err(AppError::new(
                codes::INDEX_BUILD_FAILED,
                "Embedding collaborator returned empty vectors",
            ));
        }
        if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dims) {
            return Err(AppError::new(
                codes::INDEX_BUILD_FAILED,
                "Embedding dimension mismatch across chunks",
            )
            .with_details(format!(
                "expected={dims}; got={}; chunk_id={}",
                v.len(),
                chunks[i].id
            )));
        }

        let storage_ids = assign_storage_ids(chunks);
        let entries: Vec<IndexEntry> = chunks
            .iter()
            .zip(storage_ids)
            .zip(vectors)
            .map(|((chunk, storage_id), vector)| IndexEntry {
                storage_id,
                vector,
                text: chunk.text.clone(),
                metadata: chunk.metadata(),
            })
            .collect();

        let stamp = IndexStamp {
            embedding_model: self.model.clone(),
            dims: dims as u32,
            chunk_set_sha256: fingerprint,
            updated_at: sqlite::now_rfc3339()?,
        };

        let _g = self.write_gate()?;
        self.store.replace_all(&entries, &stamp)?;
        let count = self.store.count()?;
        tracing::info!(count, model = %self.model, dims, "index built");
        Ok(BuildOutcome::Indexed { count })
    }

    fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>, AppError> {
        let mut vectors = Vec::with_capacity(chunks.len());
        for (batch_no, batch) in chunks.chunks(self.batch_size).enumerate() {
            let inputs: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let out = self.embedder.embed(&self.model, &inputs).map_err(|e| {
                AppError::new(codes::EMBEDDINGS_FAILED, "Failed to compute embeddings")
                    .with_details(format!("batch={batch_no}; err={e}"))
                    .with_retryable(e.retryable)
            })?;
            if out.len() != batch.len() {
                return Err(AppError::new(
                    codes::INDEX_BUILD_FAILED,
                    "Embedding count does not match chunk count",
                )
                .with_details(format!(
                    "batch={batch_no}; expected={}; got={}",
                    batch.len(),
                    out.len()
                )));
            }
            vectors.extend(out);
            tracing::debug!(
                batch = batch_no,
                embedded = vectors.len(),
                total = chunks.len(),
                "embedded batch"
            );
        }
        Ok(vectors)
    }

    /// Embed a single text with the index's model.
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let mut out = self.embedder.embed(&self.model, &[text.to_string()])?;
        match out.pop() {
            Some(v) if out.is_empty() && !v.is_empty() => Ok(v),
            _ => Err(AppError::new(
                codes::EMBEDDINGS_FAILED,
                "Expected exactly one non-empty embedding",
            )),
        }
    }

    /// Embed `text` and return its `k` nearest entries.
    pub fn search(&self, text: &str, k: usize) -> Result<Vec<IndexHit>, AppError> {
        let vector = self.embed_text(text)?;
        self.query(&vector, k)
    }

    /// `k` nearest entries to `vector`. Refuses an empty collection or one built in another
    /// embedding space.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexHit>, AppError> {
        let _g = self.read_gate()?;
        let info = self.store.info()?;
        if info.count == 0 {
            return Err(AppError::new(
                codes::INDEX_NOT_READY,
                "Index is empty; build it before asking questions",
            )
            .with_details(format!("collection={}", info.name)));
        }
        if let Some(stored) = info.embedding_model.as_deref() {
            if stored != self.model {
                return Err(AppError::new(
                    codes::EMBEDDING_SPACE_MISMATCH,
                    "Index was built with a different embedding model",
                )
                .with_details(format!("indexed={stored}; configured={}", self.model)));
            }
        }
        if let Some(dims) = info.dims {
            if dims as usize != vector.len() {
                return Err(AppError::new(
                    codes::EMBEDDING_SPACE_MISMATCH,
                    "Query embedding dimensions differ from the index",
                )
                .with_details(format!("indexed={dims}; query={}", vector.len())));
            }
        }
        self.store.query(vector, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_ids_disambiguate_repeats() {
        let chunks = vec![
            Chunk::new("5", "T", "1", "a"),
            Chunk::new("5", "T", "1", "b"),
            Chunk::new("5", "T", "2", "c"),
            Chunk::new("5", "T", "1", "d"),
        ];
        assert_eq!(assign_storage_ids(&chunks), vec!["5.1", "5.1~2", "5.2", "5.1~3"]);
    }

    #[test]
    fn fingerprint_tracks_ids_and_text() {
        let a = vec![Chunk::new("5", "T", "1", "text")];
        let b = vec![Chunk::new("5", "T", "1", "text!")];
        assert_eq!(chunk_set_fingerprint(&a), chunk_set_fingerprint(&a.clone()));
        assert_ne!(chunk_set_fingerprint(&a), chunk_set_fingerprint(&b));
        assert_eq!(chunk_set_fingerprint(&a).len(), 64);
    }
}
