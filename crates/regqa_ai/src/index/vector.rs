use regqa_core::domain::ChunkMetadata;
use regqa_core::error::AppError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// `1 - cosine similarity`.
    #[default]
    Cosine,
    /// Squared Euclidean distance.
    L2,
    /// `1 - dot product`.
    Ip,
}

impl DistanceMetric {
    pub fn as_str(self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::L2 => "l2",
            DistanceMetric::Ip => "ip",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cosine" => Some(DistanceMetric::Cosine),
            "l2" => Some(DistanceMetric::L2),
            "ip" => Some(DistanceMetric::Ip),
            _ => None,
        }
    }
}

/// Outcome of get-or-create on a named collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionOpen {
    Created,
    Loaded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub storage_id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexHit {
    pub storage_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub distance: f32,
}

/// Header written on every full rebuild; identifies the embedding space of the entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStamp {
    pub embedding_model: String,
    pub dims: u32,
    pub chunk_set_sha256: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub metric: DistanceMetric,
    pub embedding_model: Option<String>,
    pub dims: Option<u32>,
    pub chunk_set_sha256: Option<String>,
    pub count: u64,
    pub created_at: String,
    pub updated_at: Option<String>,
}

/// Vector index collaborator: one named collection of embedded entries.
pub trait VectorIndex: Send + Sync {
    fn count(&self) -> Result<u64, AppError>;

    fn info(&self) -> Result<CollectionInfo, AppError>;

    /// Insert or replace entries by storage id.
    fn upsert(&self, entries: &[IndexEntry]) -> Result<(), AppError>;

    /// Atomically swap the whole collection content and stamp its header.
    fn replace_all(&self, entries: &[IndexEntry], stamp: &IndexStamp) -> Result<(), AppError>;

    /// `k` nearest entries, ascending distance, ties by storage id.
    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexHit>, AppError>;
}
