//! In-memory [`Store`] implementation for tests and ephemeral sessions.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`, in insertion order.
//! Vector search is brute-force cosine similarity over matching records.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{RagError, Result};
use crate::models::{Channel, ChunkRecord, SearchHit};

use super::{rank, Filter, Store};

pub struct InMemoryStore {
    records: RwLock<Vec<ChunkRecord>>,
    meta: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            meta: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<ChunkRecord>>> {
        self.records.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<ChunkRecord>>> {
        self.records.write().map_err(|_| poisoned())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> RagError {
    RagError::IndexUnavailable("in-memory store lock poisoned".into())
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert(&self, records: &[ChunkRecord]) -> Result<()> {
        let mut stored = self.write()?;
        let mut seen: HashSet<&str> = stored.iter().map(|s| s.id.as_str()).collect();
        if let Some(dup) = records.iter().find(|r| !seen.insert(r.id.as_str())) {
            return Err(RagError::InvalidInput(format!(
                "duplicate record id: {}",
                dup.id
            )));
        }
        stored.extend(records.iter().cloned());
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<SearchHit>> {
        let stored = self.read()?;
        let hits = stored
            .iter()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.metadata)))
            .map(|r| SearchHit {
                id: r.id.clone(),
                text: r.text.clone(),
                metadata: r.metadata.clone(),
                score: cosine_similarity(query, &r.embedding),
            })
            .collect();
        Ok(rank(hits, limit))
    }

    async fn count(&self, channel: Option<Channel>) -> Result<usize> {
        let stored = self.read()?;
        Ok(match channel {
            Some(c) => stored.iter().filter(|r| r.metadata.channel == c).count(),
            None => stored.len(),
        })
    }

    async fn prune(&self, channel: Channel, keep_newest: usize) -> Result<usize> {
        let mut stored = self.write()?;
        let in_channel = stored
            .iter()
            .filter(|r| r.metadata.channel == channel)
            .count();
        let mut excess = in_channel.saturating_sub(keep_newest);
        let removed = excess;
        // Oldest first, since the vector is in insertion order.
        stored.retain(|r| {
            if excess > 0 && r.metadata.channel == channel {
                excess -= 1;
                false
            } else {
                true
            }
        });
        Ok(removed)
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let meta = self.meta.read().map_err(|_| poisoned())?;
        Ok(meta.get(key).cloned())
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let mut meta = self.meta.write().map_err(|_| poisoned())?;
        meta.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
