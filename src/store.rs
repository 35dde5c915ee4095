//! SQLite-backed vector store.
//!
//! A collection is a set of (id, embedding, document, metadata) rows under
//! a generation number; the `collections` table holds the active-generation
//! pointer. Queries are a linear cosine scan over the active generation —
//! collections here are FAQ-sized, and the scan keeps the store free of any
//! ANN index dependency.
//!
//! Rebuilds write a complete new generation first and only then flip the
//! pointer and delete the old rows, so readers never observe a partially
//! built or empty index.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use crate::models::{IngestChunk, PassageMetadata, RetrievedPassage};

#[derive(Clone)]
pub struct VectorStore {
    pool: SqlitePool,
    collection: String,
}

impl VectorStore {
    pub fn new(pool: SqlitePool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Generation currently served to queries (0 before the first ingest).
    pub async fn active_generation(&self) -> Result<i64> {
        let gen: Option<i64> =
            sqlx::query_scalar("SELECT active_generation FROM collections WHERE name = ?")
                .bind(&self.collection)
                .fetch_optional(&self.pool)
                .await?;
        Ok(gen.unwrap_or(0))
    }

    /// Upsert chunks into the active generation. Deterministic chunk ids
    /// make this idempotent for unchanged sources.
    pub async fn upsert_chunks(&self, chunks: &[(IngestChunk, Vec<f32>)]) -> Result<()> {
        let generation = self.active_generation().await?;
        self.insert_into_generation(generation, chunks).await
    }

    /// Replace the whole collection: write `chunks` as a fresh generation,
    /// then atomically flip the active pointer and drop the old rows.
    pub async fn replace_collection(&self, chunks: &[(IngestChunk, Vec<f32>)]) -> Result<()> {
        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(generation), 0) + 1 FROM chunks WHERE collection = ?",
        )
        .bind(&self.collection)
        .fetch_one(&self.pool)
        .await?;

        self.insert_into_generation(next, chunks).await?;

        // Flip + cleanup in one transaction; a failure before this point
        // leaves the previous generation fully in place.
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO collections (name, active_generation) VALUES (?, ?)
            ON CONFLICT(name) DO UPDATE SET active_generation = excluded.active_generation
            "#,
        )
        .bind(&self.collection)
        .bind(next)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM chunks WHERE collection = ? AND generation < ?")
            .bind(&self.collection)
            .bind(next)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(
            collection = %self.collection,
            generation = next,
            chunks = chunks.len(),
            "collection replaced"
        );
        Ok(())
    }

    async fn insert_into_generation(
        &self,
        generation: i64,
        chunks: &[(IngestChunk, Vec<f32>)],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (chunk, embedding) in chunks {
            let metadata_json = serde_json::to_string(&chunk.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO chunks (id, collection, generation, document, metadata_json, embedding)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, generation, id) DO UPDATE SET
                    document = excluded.document,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&chunk.id)
            .bind(&self.collection)
            .bind(generation)
            .bind(&chunk.text)
            .bind(&metadata_json)
            .bind(vec_to_blob(embedding))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// K-nearest-neighbor query by cosine distance over the active
    /// generation, ascending distance.
    pub async fn query(&self, query_vec: &[f32], k: usize) -> Result<Vec<RetrievedPassage>> {
        let generation = self.active_generation().await?;

        let rows = sqlx::query(
            "SELECT document, metadata_json, embedding FROM chunks WHERE collection = ? AND generation = ?",
        )
        .bind(&self.collection)
        .bind(generation)
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<RetrievedPassage> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let metadata_json: String = row.get("metadata_json");
                let metadata: PassageMetadata =
                    serde_json::from_str(&metadata_json).unwrap_or_default();
                RetrievedPassage {
                    document: row.get("document"),
                    metadata,
                    distance: cosine_distance(query_vec, &blob_to_vec(&blob)),
                    score: None,
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Number of chunks in the active generation.
    pub async fn len(&self) -> Result<i64> {
        let generation = self.active_generation().await?;
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE collection = ? AND generation = ?")
                .bind(&self.collection)
                .bind(generation)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
