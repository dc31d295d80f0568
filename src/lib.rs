//! # Suriel
//!
//! A retrieval-augmented assistant that answers only from a private document
//! collection and from its own earlier conversations.
//!
//! Uploaded documents are chunked, embedded and stored in a SQLite-backed
//! vector index. Each question triggers two independent searches, one over
//! documents and one over past exchanges, whose results are rendered into a
//! grounded prompt. The answer is then written back into the index as
//! memory, so later questions can draw on it.
//!
//! ## Architecture
//!
//! ```text
//!  upload ──▶ extract ──▶ chunk ──▶ embed ──▶ ┌──────────────┐
//!                                             │ VectorIndex  │
//!  question ──▶ Retriever ──┬─ documents ◀────┤  (SQLite)    │
//!                           └─ memory    ◀────┤              │
//!                  │                          └──────▲───────┘
//!                  ▼                                 │
//!          PromptAssembler ──▶ GenerationClient ──▶ MemoryRecorder
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`extract`] | PDF / DOCX / text extraction |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`store`] | Storage backends and metadata filters |
//! | [`index`] | The shared vector index |
//! | [`ingest`] | Document ingestion pipeline |
//! | [`memory`] | Conversation memory and retention |
//! | [`retrieval`] | Dual-channel retrieval |
//! | [`prompt`] | Grounded prompt assembly |
//! | [`generation`] | Chat-completions client |
//! | [`engine`] | End-to-end question answering |
//! | [`server`] | HTTP server |
//! | [`logging`] | Tracing setup |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extract;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod logging;
pub mod memory;
pub mod migrate;
pub mod models;
pub mod prompt;
pub mod retrieval;
pub mod server;
pub mod store;
