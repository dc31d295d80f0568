//! Dual-channel retrieval.
//!
//! Every query runs two independent searches with separate budgets: one over
//! the knowledge base (`channel != memory`) and one over past conversation
//! (`channel == memory`). The two result lists are never merged or re-ranked
//! against each other, so a flood of similar memories cannot crowd documents
//! out of the prompt, or the reverse.

use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::index::VectorIndex;
use crate::models::{Channel, SearchHit};
use crate::store::Filter;

/// The two context lists for one query, each best-first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievedContext {
    pub documents: Vec<String>,
    pub memories: Vec<String>,
}

pub struct Retriever {
    k_documents: usize,
    k_memory: usize,
}

impl Retriever {
    pub fn new(k_documents: usize, k_memory: usize) -> Self {
        Self {
            k_documents,
            k_memory,
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.k_documents, config.k_memory)
    }

    /// Raw hits for both channels: `(documents, memories)`.
    pub async fn retrieve_hits(
        &self,
        index: &VectorIndex,
        query: &str,
    ) -> Result<(Vec<SearchHit>, Vec<SearchHit>)> {
        let doc_filter = Filter::channel_ne(Channel::Memory);
        let mem_filter = Filter::channel_eq(Channel::Memory);

        let vector = index.embed_query(query).await?;
        let (documents, memories) = tokio::try_join!(
            index.search_vector(&vector, self.k_documents, Some(&doc_filter)),
            index.search_vector(&vector, self.k_memory, Some(&mem_filter)),
        )?;

        tracing::debug!(
            documents = documents.len(),
            memories = memories.len(),
            "retrieved context"
        );
        Ok((documents, memories))
    }

    pub async fn retrieve(&self, index: &VectorIndex, query: &str) -> Result<RetrievedContext> {
        let (documents, memories) = self.retrieve_hits(index, query).await?;
        Ok(RetrievedContext {
            documents: documents.into_iter().map(|h| h.text).collect(),
            memories: memories.into_iter().map(|h| h.text).collect(),
        })
    }
}
