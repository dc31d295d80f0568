//! Core data models shared by the ingestion and retrieval pipelines.
//!
//! Every indexed record carries exactly one [`Channel`]. The channel is the
//! only signal that separates knowledge-base content from conversation
//! memory; record text is stored verbatim with no marker prefixes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Fixed `source` value for every conversation-memory record.
pub const MEMORY_SOURCE: &str = "chat-memory";

/// Partition of the index into knowledge-base and conversation content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Document,
    Memory,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Document => "document",
            Channel::Memory => "memory",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" | "documents" => Ok(Channel::Document),
            "memory" => Ok(Channel::Memory),
            other => Err(format!(
                "unknown channel '{}': expected document or memory",
                other
            )),
        }
    }
}

/// Metadata attached to every indexed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Document filename, or [`MEMORY_SOURCE`] for conversation turns.
    pub source: String,
    pub channel: Channel,
}

impl ChunkMetadata {
    pub fn document(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            channel: Channel::Document,
        }
    }

    pub fn memory() -> Self {
        Self {
            source: MEMORY_SOURCE.to_string(),
            channel: Channel::Memory,
        }
    }
}

/// A fully embedded record, ready to be written to a store.
///
/// Records are immutable once written.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
    /// Unix timestamp (seconds) of insertion.
    pub created_at: i64,
}

/// A record returned from a similarity search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Cosine similarity to the query, higher is closer.
    pub score: f32,
}

/// One completed chat exchange.
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub user_message: String,
    pub assistant_response: String,
}

impl ConversationTurn {
    pub fn new(user_message: impl Into<String>, assistant_response: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            assistant_response: assistant_response.into(),
        }
    }

    /// Render the turn as the single text block stored in the memory channel.
    pub fn to_memory_text(&self) -> String {
        format!(
            "USER: {}\nASSISTANT: {}",
            self.user_message, self.assistant_response
        )
    }
}
