//! [`RagEngine`]: the assembled question-answering pipeline.
//!
//! ```text
//! chat:   query → Retriever (documents ∥ memory) → PromptAssembler
//!               → GenerationClient → MemoryRecorder
//! ingest: document → extract → chunk → VectorIndex.add_batch → persist
//! ```
//!
//! The engine owns no global state; the CLI and the HTTP server each build
//! one and share it behind an `Arc`.

use std::sync::Arc;

use crate::config::{ChunkingConfig, Config};
use crate::error::{RagError, Result};
use crate::extract::DocumentKind;
use crate::generation::{ChatCompletionsClient, GenerationClient};
use crate::index::VectorIndex;
use crate::ingest;
use crate::memory::MemoryRecorder;
use crate::models::ConversationTurn;
use crate::prompt::PromptAssembler;
use crate::retrieval::Retriever;

pub struct RagEngine {
    index: Arc<VectorIndex>,
    retriever: Retriever,
    assembler: PromptAssembler,
    generator: Arc<dyn GenerationClient>,
    recorder: MemoryRecorder,
    chunking: ChunkingConfig,
}

impl RagEngine {
    pub fn new(
        config: &Config,
        index: Arc<VectorIndex>,
        generator: Arc<dyn GenerationClient>,
    ) -> Self {
        Self {
            index,
            retriever: Retriever::from_config(&config.retrieval),
            assembler: PromptAssembler::from_config(&config.prompt),
            generator,
            recorder: MemoryRecorder::from_config(&config.memory),
            chunking: config.chunking.clone(),
        }
    }

    /// Open the configured index and generation client.
    ///
    /// Fails when the generation credential is missing.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let generator = Arc::new(ChatCompletionsClient::from_config(&config.generation)?);
        let index = Arc::new(VectorIndex::open(config).await?);
        Ok(Self::new(config, index, generator))
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Ingest an uploaded document. Returns the number of chunks created.
    pub async fn ingest_document(
        &self,
        name: &str,
        bytes: Vec<u8>,
        kind: DocumentKind,
    ) -> Result<usize> {
        let n = ingest::ingest_bytes(&self.index, &self.chunking, name, bytes, kind).await?;
        if let Ok(total) = self.index.count().await {
            tracing::debug!(total, "index size after ingestion");
        }
        Ok(n)
    }

    /// Answer one question and record the exchange as memory.
    ///
    /// A failure to record memory is logged; the answer is still returned.
    pub async fn chat(&self, message: &str) -> Result<String> {
        let message = message.trim();
        if message.is_empty() {
            return Err(RagError::InvalidInput("message must not be empty".into()));
        }

        let context = self.retriever.retrieve(&self.index, message).await?;
        let prompt = self
            .assembler
            .assemble(&context.documents, &context.memories, message);
        let response = self
            .generator
            .generate(&prompt, &self.assembler.system_message())
            .await?;

        let turn = ConversationTurn::new(message, response.as_str());
        if let Err(e) = self.recorder.record(&self.index, &turn).await {
            tracing::warn!(error = %e, "failed to record conversation memory");
        }

        tracing::info!(
            documents = context.documents.len(),
            memories = context.memories.len(),
            model = self.generator.model_name(),
            "chat answered"
        );
        Ok(response)
    }

    pub async fn count(&self) -> Result<usize> {
        self.index.count().await
    }

    pub async fn close(&self) -> Result<()> {
        self.index.close().await
    }
}
