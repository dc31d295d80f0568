//! SQLite-backed [`Store`] implementation.
//!
//! Records and their embeddings live in one `records` table (see
//! [`run_migrations`](crate::migrate::run_migrations)). Filters become SQL
//! `WHERE` clauses, so only matching rows are scored; scoring itself is
//! brute-force cosine similarity over the decoded BLOBs.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{RagError, Result};
use crate::models::{Channel, ChunkMetadata, ChunkRecord, SearchHit};

use super::{rank, Filter, FilterField, FilterOp, Store};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn filter_clause(filter: &Filter) -> &'static str {
    match (filter.field, filter.op) {
        (FilterField::Channel, FilterOp::Eq) => " WHERE channel = ?",
        (FilterField::Channel, FilterOp::Ne) => " WHERE channel != ?",
        (FilterField::Source, FilterOp::Eq) => " WHERE source = ?",
        (FilterField::Source, FilterOp::Ne) => " WHERE source != ?",
    }
}

fn row_to_hit(row: &SqliteRow, query: &[f32]) -> Result<SearchHit> {
    let channel: String = row.get("channel");
    let channel: Channel = channel.parse().map_err(RagError::IndexUnavailable)?;
    let blob: Vec<u8> = row.get("embedding");

    Ok(SearchHit {
        id: row.get("id"),
        text: row.get("text"),
        metadata: ChunkMetadata {
            source: row.get("source"),
            channel,
        },
        score: cosine_similarity(query, &blob_to_vec(&blob)),
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert(&self, records: &[ChunkRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            let result = sqlx::query(
                r#"
                INSERT INTO records (id, text, channel, source, created_at, embedding)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.id)
            .bind(&record.text)
            .bind(record.metadata.channel.as_str())
            .bind(&record.metadata.source)
            .bind(record.created_at)
            .bind(vec_to_blob(&record.embedding))
            .execute(&mut *tx)
            .await;

            if let Err(err) = result {
                // Dropping `tx` rolls the whole batch back.
                return Err(match &err {
                    sqlx::Error::Database(db) if db.is_unique_violation() => {
                        RagError::InvalidInput(format!("duplicate record id: {}", record.id))
                    }
                    _ => err.into(),
                });
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<SearchHit>> {
        let mut sql = String::from("SELECT id, text, channel, source, embedding FROM records");
        if let Some(f) = filter {
            sql.push_str(filter_clause(f));
        }
        sql.push_str(" ORDER BY seq ASC");

        let mut q = sqlx::query(&sql);
        if let Some(f) = filter {
            q = q.bind(&f.value);
        }
        let rows = q.fetch_all(&self.pool).await?;

        let hits = rows
            .iter()
            .map(|row| row_to_hit(row, query))
            .collect::<Result<Vec<_>>>()?;
        Ok(rank(hits, limit))
    }

    async fn count(&self, channel: Option<Channel>) -> Result<usize> {
        let n: i64 = match channel {
            Some(c) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE channel = ?")
                    .bind(c.as_str())
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM records")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(n as usize)
    }

    async fn prune(&self, channel: Channel, keep_newest: usize) -> Result<usize> {
        let result = sqlx::query(
            r#"
            DELETE FROM records
            WHERE channel = ?
              AND seq NOT IN (
                  SELECT seq FROM records WHERE channel = ? ORDER BY seq DESC LIMIT ?
              )
            "#,
        )
        .bind(channel.as_str())
        .bind(channel.as_str())
        .bind(keep_newest as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() as usize)
    }

    async fn flush(&self) -> Result<()> {
        sqlx::query("PRAGMA wal_checkpoint(FULL)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO index_meta (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
