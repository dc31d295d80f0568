//! The process-wide vector index manager.
//!
//! [`VectorIndex`] pairs a [`Store`] with an [`Embedder`]: callers hand it
//! text and metadata, it embeds, assigns ids and writes. One instance is
//! opened at startup, shared behind an `Arc`, and closed at shutdown.
//!
//! Writes go through an async write gate so concurrent ingestions and memory
//! records never interleave inside a batch. Reads take no lock.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::Config;
use crate::db;
use crate::embedding::{create_embedder, embed_one, Embedder};
use crate::error::{RagError, Result};
use crate::migrate;
use crate::models::{Channel, ChunkMetadata, ChunkRecord, SearchHit};
use crate::store::{Filter, SqliteStore, Store};

const META_EMBEDDING_MODEL: &str = "embedding_model";

pub struct VectorIndex {
    store: Arc<dyn Store>,
    embedder: Arc<dyn Embedder>,
    write_gate: Mutex<()>,
}

impl VectorIndex {
    /// Open the SQLite-backed index named by `config.db.path`, creating the
    /// schema and the configured embedder.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let pool = db::connect(&config.db.path).await?;
        migrate::run_migrations(&pool).await?;
        let index = Self::with_parts(Arc::new(SqliteStore::new(pool)), embedder).await?;
        tracing::info!(
            path = %config.db.path.display(),
            model = index.embedder.model_name(),
            "vector index opened"
        );
        Ok(index)
    }

    /// Assemble an index from an existing store and embedder.
    ///
    /// Fails if the store was written by a different embedding model.
    pub async fn with_parts(store: Arc<dyn Store>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let index = Self {
            store,
            embedder,
            write_gate: Mutex::new(()),
        };
        index.check_embedding_model().await?;
        Ok(index)
    }

    fn model_signature(&self) -> String {
        format!("{}:{}", self.embedder.model_name(), self.embedder.dims())
    }

    async fn check_embedding_model(&self) -> Result<()> {
        // A disabled embedder writes nothing, so it cannot conflict.
        if self.embedder.dims() == 0 {
            return Ok(());
        }
        let current = self.model_signature();
        match self.store.get_meta(META_EMBEDDING_MODEL).await? {
            Some(stored) if stored != current => Err(RagError::IndexUnavailable(format!(
                "index was built with embedding model '{}' but '{}' is configured; \
                 use a fresh database path or the original model",
                stored, current
            ))),
            Some(_) => Ok(()),
            None => self.store.set_meta(META_EMBEDDING_MODEL, &current).await,
        }
    }

    /// Embed and store one record. Returns its new id.
    pub async fn add(&self, text: &str, metadata: ChunkMetadata) -> Result<String> {
        let mut ids = self.add_batch(vec![(text.to_string(), metadata)]).await?;
        ids.pop()
            .ok_or_else(|| RagError::IndexUnavailable("insert returned no id".into()))
    }

    /// Embed every text, then store all records in one atomic write.
    ///
    /// Nothing is written if embedding any item fails.
    pub async fn add_batch(&self, items: Vec<(String, ChunkMetadata)>) -> Result<Vec<String>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = items.iter().map(|(t, _)| t.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != items.len() {
            return Err(RagError::EmbeddingUnavailable(format!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                items.len()
            )));
        }
        let dims = self.embedder.dims();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(RagError::EmbeddingUnavailable(format!(
                "embedding has {} dimensions, expected {}",
                bad.len(),
                dims
            )));
        }

        let now = chrono::Utc::now().timestamp();
        let records: Vec<ChunkRecord> = items
            .into_iter()
            .zip(vectors)
            .map(|((text, metadata), embedding)| ChunkRecord {
                id: uuid::Uuid::new_v4().to_string(),
                text,
                embedding,
                metadata,
                created_at: now,
            })
            .collect();
        let ids = records.iter().map(|r| r.id.clone()).collect();

        let _guard = self.write_gate.lock().await;
        self.store.insert(&records).await?;
        Ok(ids)
    }

    /// Top `k` records most similar to `query`, restricted to `filter`.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embed_query(query).await?;
        self.search_vector(&vector, k, filter).await
    }

    /// Embed a query once so several searches can share the vector.
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        embed_one(self.embedder.as_ref(), query).await
    }

    /// Like [`search`](Self::search), for an already-embedded query.
    pub async fn search_vector(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        self.store.search(vector, k, filter).await
    }

    /// Flush prior writes to durable storage.
    pub async fn persist(&self) -> Result<()> {
        let _guard = self.write_gate.lock().await;
        self.store.flush().await
    }

    pub async fn count(&self) -> Result<usize> {
        self.store.count(None).await
    }

    pub async fn count_channel(&self, channel: Channel) -> Result<usize> {
        self.store.count(Some(channel)).await
    }

    /// Keep only the `keep_newest` most recent records of `channel`.
    pub async fn prune(&self, channel: Channel, keep_newest: usize) -> Result<usize> {
        let _guard = self.write_gate.lock().await;
        self.store.prune(channel, keep_newest).await
    }

    /// Flush and release the store.
    pub async fn close(&self) -> Result<()> {
        let _guard = self.write_gate.lock().await;
        self.store.flush().await?;
        self.store.close().await
    }
}
