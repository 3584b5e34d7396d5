use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use regqa_core::db;
use regqa_core::domain::ChunkMetadata;
use regqa_core::error::{codes, AppError};
use rusqlite::{params, Connection, OptionalExtension};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::similarity::{distance, l2_norm};
use super::vector::{
    CollectionInfo, CollectionOpen, DistanceMetric, IndexEntry, IndexHit, IndexStamp, VectorIndex,
};

pub(crate) fn now_rfc3339() -> Result<String, AppError> {
    OffsetDateTime::now_utc().format(&Rfc3339).map_err(|e| {
        AppError::new(codes::INDEX_BUILD_FAILED, "Failed to format timestamp")
            .with_details(e.to_string())
    })
}

fn db_err(message: &str, e: rusqlite::Error) -> AppError {
    AppError::new(codes::INDEX_UNAVAILABLE, message).with_details(e.to_string())
}

fn encode_vector(v: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len() * 4);
    for x in v {
        out.extend_from_slice(&x.to_le_bytes());
    }
    out
}

fn decode_vector(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}

/// One named collection persisted in the SQLite index database.
pub struct SqliteVectorIndex {
    conn: Mutex<Connection>,
    name: String,
    metric: DistanceMetric,
}

impl std::fmt::Debug for SqliteVectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteVectorIndex")
            .field("name", &self.name)
            .field("metric", &self.metric)
            .finish()
    }
}

impl SqliteVectorIndex {
    /// Open (or create) the database at `path`, migrate it, then get-or-create `name`.
    pub fn open(
        path: &Path,
        name: &str,
        metric: DistanceMetric,
    ) -> Result<(Self, CollectionOpen), AppError> {
        let mut conn = db::open(path)?;
        db::migrate(&mut conn)?;
        Self::get_or_create(conn, name, metric)
    }

    pub fn open_in_memory(
        name: &str,
        metric: DistanceMetric,
    ) -> Result<(Self, CollectionOpen), AppError> {
        let mut conn = db::open_in_memory()?;
        db::migrate(&mut conn)?;
        Self::get_or_create(conn, name, metric)
    }

    /// Load the collection when it exists; create it otherwise.
    /// An existing collection keeps the metric it was created with.
    pub fn get_or_create(
        conn: Connection,
        name: &str,
        metric: DistanceMetric,
    ) -> Result<(Self, CollectionOpen), AppError> {
        let existing: Option<String> = conn
            .query_row(
                "SELECT metric FROM collections WHERE name=?1",
                [name],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| db_err("Failed to look up collection", e))?;

        let (metric, open) = match existing {
            Some(stored) => {
                let stored_metric = DistanceMetric::parse(&stored).ok_or_else(|| {
                    AppError::new(codes::INDEX_UNAVAILABLE, "Collection has unknown metric")
                        .with_details(format!("collection={name}; metric={stored}"))
                })?;
                if stored_metric != metric {
                    tracing::warn!(
                        collection = name,
                        stored = stored_metric.as_str(),
                        requested = metric.as_str(),
                        "collection exists with a different metric; keeping stored metric"
                    );
                }
                (stored_metric, CollectionOpen::Loaded)
            }
            None => {
                conn.execute(
                    "INSERT INTO collections(name, metric, created_at) VALUES (?1, ?2, ?3)",
                    params![name, metric.as_str(), now_rfc3339()?],
                )
                .map_err(|e| db_err("Failed to create collection", e))?;
                (metric, CollectionOpen::Created)
            }
        };

        tracing::debug!(collection = name, metric = metric.as_str(), ?open, "opened collection");
        Ok((
            Self {
                conn: Mutex::new(conn),
                name: name.to_string(),
                metric,
            },
            open,
        ))
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.conn.lock().map_err(|_| {
            AppError::new(codes::INDEX_UNAVAILABLE, "Index connection lock poisoned")
                .with_details(format!("collection={}", self.name))
        })
    }

    fn insert_entries(
        tx: &rusqlite::Transaction<'_>,
        collection: &str,
        first_ordinal: i64,
        entries: &[IndexEntry],
    ) -> Result<(), AppError> {
        let mut stmt = tx
            .prepare(
                r#"
                INSERT INTO entries(collection, storage_id, ordinal, text, metadata_json, vector)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(collection, storage_id) DO UPDATE SET
                  text=excluded.text,
                  metadata_json=excluded.metadata_json,
                  vector=excluded.vector
                "#,
            )
            .map_err(|e| db_err("Failed to prepare entry insert", e))?;

        for (i, entry) in entries.iter().enumerate() {
            let metadata_json = serde_json::to_string(&entry.metadata).map_err(|e| {
                AppError::new(codes::INDEX_BUILD_FAILED, "Failed to encode entry metadata")
                    .with_details(format!("storage_id={}; err={}", entry.storage_id, e))
            })?;
            stmt.execute(params![
                collection,
                entry.storage_id,
                first_ordinal + i as i64,
                entry.text,
                metadata_json,
                encode_vector(&entry.vector),
            ])
            .map_err(|e| {
                AppError::new(codes::INDEX_BUILD_FAILED, "Failed to write index entry")
                    .with_details(format!("storage_id={}; err={}", entry.storage_id, e))
            })?;
        }
        Ok(())
    }
}

impl VectorIndex for SqliteVectorIndex {
    fn count(&self) -> Result<u64, AppError> {
        let conn = self.lock()?;
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM entries WHERE collection=?1",
                [&self.name],
                |row| row.get(0),
            )
            .map_err(|e| db_err("Failed to count index entries", e))?;
        Ok(n.max(0) as u64)
    }

    fn info(&self) -> Result<CollectionInfo, AppError> {
        let count = self.count()?;
        let conn = self.lock()?;
        conn.query_row(
            r#"
            SELECT embedding_model, dims, chunk_set_sha256, created_at, updated_at
            FROM collections WHERE name=?1
            "#,
            [&self.name],
            |row| {
                Ok(CollectionInfo {
                    name: self.name.clone(),
                    metric: self.metric,
                    embedding_model: row.get(0)?,
                    dims: row.get(1)?,
                    chunk_set_sha256: row.get(2)?,
                    count,
                    created_at: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            },
        )
        .map_err(|e| db_err("Failed to read collection header", e))
    }

    fn upsert(&self, entries: &[IndexEntry]) -> Result<(), AppError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(|e| {
            AppError::new(codes::DB_TX_FAILED, "Failed to start index transaction")
                .with_details(e.to_string())
        })?;
        let next: i64 = tx
            .query_row(
                "SELECT COALESCE(MAX(ordinal) + 1, 0) FROM entries WHERE collection=?1",
                [&self.name],
                |row| row.get(0),
            )
            .map_err(|e| db_err("Failed to read next ordinal", e))?;
        Self::insert_entries(&tx, &self.name, next, entries)?;
        tx.commit().map_err(|e| {
            AppError::new(codes::DB_TX_FAILED, "Failed to commit index transaction")
                .with_details(e.to_string())
        })
    }

    fn replace_all(&self, entries: &[IndexEntry], stamp: &IndexStamp) -> Result<(), AppError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(|e| {
            AppError::new(codes::DB_TX_FAILED, "Failed to start index transaction")
                .with_details(e.to_string())
        })?;
        tx.execute("DELETE FROM entries WHERE collection=?1", [&self.name])
            .map_err(|e| {
                AppError::new(codes::INDEX_BUILD_FAILED, "Failed to clear index entries")
                    .with_details(e.to_string())
            })?;
        Self::insert_entries(&tx, &self.name, 0, entries)?;
        tx.execute(
            r#"
            UPDATE collections
            SET embedding_model=?2, dims=?3, chunk_set_sha256=?4, updated_at=?5
            WHERE name=?1
            "#,
            params![
                self.name,
                stamp.embedding_model,
                stamp.dims,
                stamp.chunk_set_sha256,
                stamp.updated_at
            ],
        )
        .map_err(|e| {
            AppError::new(codes::INDEX_BUILD_FAILED, "Failed to stamp collection header")
                .with_details(e.to_string())
        })?;
        tx.commit().map_err(|e| {
            AppError::new(codes::DB_TX_FAILED, "Failed to commit index transaction")
                .with_details(e.to_string())
        })
    }

    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexHit>, AppError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_norm = l2_norm(vector);

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT storage_id, text, metadata_json, vector FROM entries WHERE collection=?1",
            )
            .map_err(|e| db_err("Failed to prepare index query", e))?;
        let rows = stmt
            .query_map([&self.name], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                ))
            })
            .map_err(|e| db_err("Failed to run index query", e))?;

        let mut hits = Vec::new();
        for row in rows {
            let (storage_id, text, metadata_json, blob) =
                row.map_err(|e| db_err("Failed to read index row", e))?;
            let v = decode_vector(&blob).ok_or_else(|| {
                AppError::new(codes::INDEX_UNAVAILABLE, "Stored vector is corrupt")
                    .with_details(format!("storage_id={storage_id}; bytes={}", blob.len()))
            })?;
            if v.len() != vector.len() {
                return Err(AppError::new(
                    codes::EMBEDDING_SPACE_MISMATCH,
                    "Query vector dimensions differ from indexed vectors",
                )
                .with_details(format!(
                    "storage_id={storage_id}; indexed={}; query={}",
                    v.len(),
                    vector.len()
                )));
            }
            let Some(d) = distance(self.metric, vector, query_norm, &v) else {
                continue;
            };
            let metadata: ChunkMetadata = serde_json::from_str(&metadata_json).map_err(|e| {
                AppError::new(codes::INDEX_UNAVAILABLE, "Stored metadata is corrupt")
                    .with_details(format!("storage_id={storage_id}; err={e}"))
            })?;
            hits.push(IndexHit {
                storage_id,
                text,
                metadata,
                distance: d,
            });
        }

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.storage_id.cmp(&b.storage_id))
        });
        hits.truncate(k);
        Ok(hits)
    }
}
