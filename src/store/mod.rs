//! Storage abstraction for the vector index.
//!
//! The [`Store`] trait is everything the index needs from a backend: atomic
//! batch insert, filtered similarity search, counting, retention pruning and
//! a durability flush. Two backends ship:
//!
//! - [`SqliteStore`]: the persistent index (one SQLite file).
//! - [`InMemoryStore`]: ephemeral, for tests and throwaway sessions.
//!
//! Implementations must be `Send + Sync` to be shared across request tasks.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Channel, ChunkMetadata, ChunkRecord, SearchHit};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Metadata field a [`Filter`] tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Channel,
    Source,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
}

/// A single equality / inequality predicate over chunk metadata.
///
/// Filters are applied before ranking, so a filtered search returns the top
/// results *among matching records*, never a truncated global top-k.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: FilterField,
    pub op: FilterOp,
    pub value: String,
}

impl Filter {
    pub fn channel_eq(channel: Channel) -> Self {
        Self {
            field: FilterField::Channel,
            op: FilterOp::Eq,
            value: channel.as_str().to_string(),
        }
    }

    pub fn channel_ne(channel: Channel) -> Self {
        Self {
            field: FilterField::Channel,
            op: FilterOp::Ne,
            value: channel.as_str().to_string(),
        }
    }

    pub fn source_eq(source: impl Into<String>) -> Self {
        Self {
            field: FilterField::Source,
            op: FilterOp::Eq,
            value: source.into(),
        }
    }

    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        let actual = match self.field {
            FilterField::Channel => metadata.channel.as_str(),
            FilterField::Source => metadata.source.as_str(),
        };
        match self.op {
            FilterOp::Eq => actual == self.value,
            FilterOp::Ne => actual != self.value,
        }
    }
}

/// Abstract storage backend for the vector index.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert`](Store::insert) | Add a batch of records, all or nothing |
/// | [`search`](Store::search) | Cosine top-k, optionally filtered |
/// | [`count`](Store::count) | Record count, optionally per channel |
/// | [`prune`](Store::prune) | Keep only the newest n records of a channel |
/// | [`flush`](Store::flush) | Force committed data to durable storage |
/// | [`get_meta`](Store::get_meta) / [`set_meta`](Store::set_meta) | Index-level key/value metadata |
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a batch of records. Either every record becomes visible or none do.
    async fn insert(&self, records: &[ChunkRecord]) -> Result<()>;

    /// Return up to `limit` records most similar to `query`, best first.
    ///
    /// Equal scores keep insertion order.
    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<SearchHit>>;

    async fn count(&self, channel: Option<Channel>) -> Result<usize>;

    /// Delete all but the `keep_newest` most recently inserted records of
    /// `channel`. Returns how many were removed.
    async fn prune(&self, channel: Channel, keep_newest: usize) -> Result<usize>;

    async fn flush(&self) -> Result<()>;

    async fn get_meta(&self, key: &str) -> Result<Option<String>>;

    async fn set_meta(&self, key: &str, value: &str) -> Result<()>;

    /// Release backend resources. Further calls may fail.
    async fn close(&self) -> Result<()>;
}

/// Sort scored hits best-first and keep the top `limit`.
///
/// `hits` must be in insertion order; the sort is stable so ties keep it.
pub(crate) fn rank(mut hits: Vec<SearchHit>, limit: usize) -> Vec<SearchHit> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(limit);
    hits
}
