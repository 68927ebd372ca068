//! Brute-force vector index stored in the `vector_records` table.
//!
//! The tenant filter is applied in SQL (`WHERE company_id = ?`) so vectors
//! from other companies are never loaded, let alone scored. Cosine
//! similarity is computed in Rust over the remaining rows.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use synapse_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use synapse_core::index::{VectorFilter, VectorIndex, VectorMatch, VectorMetadata, VectorRecord};

#[derive(Clone)]
pub struct SqliteVectorIndex {
    pool: SqlitePool,
}

impl SqliteVectorIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn count(&self, company_id: &str) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vector_records WHERE company_id = ?")
            .bind(company_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

fn metadata_from_row(row: &SqliteRow) -> Result<VectorMetadata> {
    let data_type: String = row.try_get("data_type")?;
    Ok(VectorMetadata {
        document_id: row.try_get("document_id")?,
        company_id: row.try_get("company_id")?,
        title: row.try_get("title")?,
        content_preview: row.try_get("content_preview")?,
        data_type: data_type.parse()?,
        source_url: row.try_get("source_url")?,
    })
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorMatch>> {
        let rows = sqlx::query(
            r#"
            SELECT id, company_id, document_id, title, content_preview, data_type, source_url, embedding
            FROM vector_records
            WHERE company_id = ?1 AND (?2 IS NULL OR document_id = ?2)
            "#,
        )
        .bind(&filter.company_id)
        .bind(&filter.document_id)
        .fetch_all(&self.pool)
        .await?;

        let mut matches = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.try_get("embedding")?;
            let values = blob_to_vec(&blob);
            matches.push(VectorMatch {
                id: row.try_get("id")?,
                score: cosine_similarity(vector, &values) as f64,
                metadata: metadata_from_row(row)?,
            });
        }

        // Sort by similarity desc and take top K
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(top_k);
        debug!(
            company_id = %filter.company_id,
            scanned = rows.len(),
            returned = matches.len(),
            "vector query"
        );
        Ok(matches)
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            if record.values.is_empty() {
                bail!("refusing to index empty vector {}", record.id);
            }
            let meta = &record.metadata;
            sqlx::query(
                r#"
                INSERT INTO vector_records
                    (id, company_id, document_id, title, content_preview, data_type, source_url, dims, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    company_id = excluded.company_id,
                    document_id = excluded.document_id,
                    title = excluded.title,
                    content_preview = excluded.content_preview,
                    data_type = excluded.data_type,
                    source_url = excluded.source_url,
                    dims = excluded.dims,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&record.id)
            .bind(&meta.company_id)
            .bind(&meta.document_id)
            .bind(&meta.title)
            .bind(&meta.content_preview)
            .bind(meta.data_type.to_string())
            .bind(&meta.source_url)
            .bind(record.values.len() as i64)
            .bind(vec_to_blob(&record.values))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM vector_records WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_by_filter(&self, filter: &VectorFilter) -> Result<usize> {
        let result = sqlx::query(
            "DELETE FROM vector_records WHERE company_id = ?1 AND (?2 IS NULL OR document_id = ?2)",
        )
        .bind(&filter.company_id)
        .bind(&filter.document_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as usize)
    }
}
