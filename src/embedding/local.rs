//! In-process sentence-transformer embeddings via fastembed.
//!
//! The model is downloaded from Hugging Face on first use and cached; after
//! that no network calls are made. Loading and inference run on the blocking
//! thread pool so they never stall the async workers.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};

const DEFAULT_LOCAL_MODEL: &str = "all-minilm-l6-v2";

pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    fastembed_model: fastembed::EmbeddingModel,
    /// Loaded lazily on the first embed call.
    model: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
}

impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string());
        let (fastembed_model, native_dims) = resolve_model(&model_name)?;

        Ok(Self {
            dims: config.dims.unwrap_or(native_dims),
            model_name,
            batch_size: config.batch_size,
            fastembed_model,
            model: Arc::new(Mutex::new(None)),
        })
    }
}

fn resolve_model(name: &str) -> anyhow::Result<(fastembed::EmbeddingModel, usize)> {
    use fastembed::EmbeddingModel as M;
    match name {
        "all-minilm-l6-v2" => Ok((M::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((M::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((M::BGEBaseENV15, 768)),
        "multilingual-e5-small" => Ok((M::MultilingualE5Small, 384)),
        "multilingual-e5-base" => Ok((M::MultilingualE5Base, 768)),
        other => anyhow::bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, \
             multilingual-e5-small, multilingual-e5-base",
            other
        ),
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let slot = Arc::clone(&self.model);
        let fastembed_model = self.fastembed_model.clone();
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut guard = slot.lock().map_err(|_| {
                RagError::EmbeddingUnavailable("local embedding model lock poisoned".into())
            })?;

            if guard.is_none() {
                let loaded = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
                )
                .map_err(|e| {
                    RagError::EmbeddingUnavailable(format!(
                        "Failed to initialize local embedding model: {}",
                        e
                    ))
                })?;
                *guard = Some(loaded);
            }

            let model = guard.as_mut().ok_or_else(|| {
                RagError::EmbeddingUnavailable("local embedding model not loaded".into())
            })?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| RagError::EmbeddingUnavailable(format!("Local embedding failed: {}", e)))
        })
        .await
        .map_err(|e| RagError::EmbeddingUnavailable(format!("embedding task failed: {}", e)))?
    }
}
