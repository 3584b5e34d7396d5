use serde::{Deserialize, Serialize};

/// Smallest retrievable unit of regulation text: one numbered point of one article.
///
/// Notes:
/// - `id` is always `"{article_num}.{point_num}"`.
/// - `text` is trimmed and never empty.
/// - Article number/title are repeated on every point of the article so a chunk can be
///   cited on its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub id: String,
    pub article_num: String,
    pub article_title: String,
    pub point_num: String,
    pub text: String,
}

impl Chunk {
    pub fn new(
        article_num: impl Into<String>,
        article_title: impl Into<String>,
        point_num: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let article_num = article_num.into();
        let point_num = point_num.into();
        Self {
            id: format!("{article_num}.{point_num}"),
            article_num,
            article_title: article_title.into(),
            point_num,
            text: text.into(),
        }
    }

    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            article_num: self.article_num.clone(),
            article_title: self.article_title.clone(),
            point_num: self.point_num.clone(),
            chunk_id: self.id.clone(),
        }
    }
}

/// Location metadata stored next to each indexed vector and used for citations.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub article_num: String,
    pub article_title: String,
    pub point_num: String,
    /// Logical chunk id (`"{article}.{point}"`).
    pub chunk_id: String,
}
