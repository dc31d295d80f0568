//! Conversational memory: completed chat turns written back into the index.
//!
//! Each turn becomes exactly one record on the memory channel, never split
//! however long it is, so later questions can retrieve earlier exchanges the
//! same way they retrieve documents.

use crate::config::MemoryConfig;
use crate::error::Result;
use crate::index::VectorIndex;
use crate::models::{Channel, ChunkMetadata, ConversationTurn};

/// How many memory records to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    Unbounded,
    /// Evict oldest-first beyond this many records.
    KeepNewest(usize),
}

impl RetentionPolicy {
    /// `0` means unbounded.
    pub fn from_max_records(max_records: usize) -> Self {
        match max_records {
            0 => RetentionPolicy::Unbounded,
            n => RetentionPolicy::KeepNewest(n),
        }
    }
}

pub struct MemoryRecorder {
    retention: RetentionPolicy,
    retries: u32,
}

impl MemoryRecorder {
    pub fn new(retention: RetentionPolicy, retries: u32) -> Self {
        Self { retention, retries }
    }

    pub fn from_config(config: &MemoryConfig) -> Self {
        Self::new(
            RetentionPolicy::from_max_records(config.max_records),
            config.persist_retries,
        )
    }

    /// Store `turn` as a memory record, flush, then apply retention.
    /// Returns the new record's id.
    pub async fn record(&self, index: &VectorIndex, turn: &ConversationTurn) -> Result<String> {
        let text = turn.to_memory_text();
        let id = index.add(&text, ChunkMetadata::memory()).await?;

        // Only the flush is retried; the record is already in the store.
        let mut attempt = 0;
        loop {
            match index.persist().await {
                Ok(()) => break,
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %e, "memory persist failed, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        if let RetentionPolicy::KeepNewest(n) = self.retention {
            let evicted = index.prune(Channel::Memory, n).await?;
            if evicted > 0 {
                tracing::debug!(evicted, keep = n, "memory retention applied");
            }
        }

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::error::RagError;
    use crate::models::{ChunkRecord, SearchHit, MEMORY_SOURCE};
    use crate::store::{Filter, InMemoryStore, Store};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Fails the first `failures` flushes, otherwise behaves like `InMemoryStore`.
    struct FlakyFlushStore {
        inner: InMemoryStore,
        failures: AtomicUsize,
    }

    #[async_trait]
    impl Store for FlakyFlushStore {
        async fn insert(&self, records: &[ChunkRecord]) -> Result<()> {
            self.inner.insert(records).await
        }
        async fn search(
            &self,
            query: &[f32],
            limit: usize,
            filter: Option<&Filter>,
        ) -> Result<Vec<SearchHit>> {
            self.inner.search(query, limit, filter).await
        }
        async fn count(&self, channel: Option<Channel>) -> Result<usize> {
            self.inner.count(channel).await
        }
        async fn prune(&self, channel: Channel, keep_newest: usize) -> Result<usize> {
            self.inner.prune(channel, keep_newest).await
        }
        async fn flush(&self) -> Result<()> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(RagError::IndexUnavailable("disk busy".into()));
            }
            self.inner.flush().await
        }
        async fn get_meta(&self, key: &str) -> Result<Option<String>> {
            self.inner.get_meta(key).await
        }
        async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
            self.inner.set_meta(key, value).await
        }
        async fn close(&self) -> Result<()> {
            self.inner.close().await
        }
    }

    async fn flaky_index(failures: usize) -> VectorIndex {
        let store = FlakyFlushStore {
            inner: InMemoryStore::new(),
            failures: AtomicUsize::new(failures),
        };
        VectorIndex::with_parts(Arc::new(store), Arc::new(HashEmbedder::new(64)))
            .await
            .unwrap()
    }

    async fn index() -> VectorIndex {
        VectorIndex::with_parts(Arc::new(InMemoryStore::new()), Arc::new(HashEmbedder::new(64)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_turn_is_one_memory_record() {
        let index = index().await;
        let recorder = MemoryRecorder::new(RetentionPolicy::Unbounded, 0);
        let long_answer = "word ".repeat(2000);
        recorder
            .record(&index, &ConversationTurn::new("Q1", long_answer.clone()))
            .await
            .unwrap();

        assert_eq!(index.count_channel(Channel::Memory).await.unwrap(), 1);
        let hits = index
            .search("Q1", 6, Some(&Filter::channel_eq(Channel::Memory)))
            .await
            .unwrap();
        assert_eq!(hits[0].metadata.source, MEMORY_SOURCE);
        assert!(hits[0].text.starts_with("USER: Q1\nASSISTANT: word"));
        assert_eq!(hits[0].text.len(), "USER: Q1\nASSISTANT: ".len() + long_answer.len());
    }

    #[tokio::test]
    async fn test_keep_newest_evicts_oldest() {
        let index = index().await;
        index
            .add("unrelated doc", ChunkMetadata::document("d.txt"))
            .await
            .unwrap();
        let recorder = MemoryRecorder::new(RetentionPolicy::KeepNewest(2), 0);
        for i in 0..4 {
            recorder
                .record(&index, &ConversationTurn::new(format!("q{}", i), "a"))
                .await
                .unwrap();
        }

        assert_eq!(index.count_channel(Channel::Memory).await.unwrap(), 2);
        assert_eq!(index.count_channel(Channel::Document).await.unwrap(), 1);
        let hits = index
            .search("q0", 6, Some(&Filter::channel_eq(Channel::Memory)))
            .await
            .unwrap();
        assert!(hits.iter().all(|h| !h.text.contains("USER: q0\n")));
    }

    #[test]
    fn test_zero_means_unbounded() {
        assert_eq!(RetentionPolicy::from_max_records(0), RetentionPolicy::Unbounded);
        assert_eq!(RetentionPolicy::from_max_records(5), RetentionPolicy::KeepNewest(5));
    }

    #[tokio::test]
    async fn test_flush_retry_does_not_duplicate_turn() {
        let index = flaky_index(1).await;
        let recorder = MemoryRecorder::new(RetentionPolicy::Unbounded, 1);
        recorder
            .record(&index, &ConversationTurn::new("Q1", "A1"))
            .await
            .unwrap();
        assert_eq!(index.count_channel(Channel::Memory).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_flush_failure_after_retries_is_reported() {
        let index = flaky_index(3).await;
        let recorder = MemoryRecorder::new(RetentionPolicy::Unbounded, 1);
        let err = recorder
            .record(&index, &ConversationTurn::new("Q1", "A1"))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::IndexUnavailable(_)));
        assert_eq!(index.count_channel(Channel::Memory).await.unwrap(), 1);
    }
}
