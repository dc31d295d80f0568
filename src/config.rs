//! TOML configuration parsing and validation.
//!
//! Every section except `[db]` is optional and falls back to the defaults the
//! assistant was tuned with (1000/100 chunking, 9 document + 6 memory
//! retrieval budget, `llama-3.1-8b-instant` at temperature 0.2).
//!
//! ```toml
//! [db]
//! path = "./data/suriel.sqlite"
//!
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 100
//!
//! [retrieval]
//! k_documents = 9
//! k_memory = 6
//!
//! [embedding]
//! provider = "local"
//!
//! [generation]
//! model = "llama-3.1-8b-instant"
//!
//! [server]
//! bind = "127.0.0.1:8000"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::chunk::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

/// Per-channel retrieval budgets. The two budgets are never pooled.
#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k_documents")]
    pub k_documents: usize,
    #[serde(default = "default_k_memory")]
    pub k_memory: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k_documents: default_k_documents(),
            k_memory: default_k_memory(),
        }
    }
}

fn default_k_documents() -> usize {
    9
}
fn default_k_memory() -> usize {
    6
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MemoryConfig {
    /// Maximum memory records kept; oldest are evicted first. `0` keeps all.
    #[serde(default)]
    pub max_records: usize,
    /// Extra attempts when recording a turn fails. `0` never retries.
    #[serde(default)]
    pub persist_retries: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// Any OpenAI-compatible `chat/completions` endpoint; Groq by default.
    #[serde(default = "default_generation_base_url")]
    pub base_url: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Environment variable holding the provider credential.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_generation_base_url(),
            model: default_generation_model(),
            temperature: default_temperature(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

fn default_generation_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_generation_model() -> String {
    "llama-3.1-8b-instant".to_string()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}
fn default_generation_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,
    /// Exact sentence the model must answer with when the context lacks the answer.
    #[serde(default = "default_refusal")]
    pub refusal: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            assistant_name: default_assistant_name(),
            refusal: default_refusal(),
        }
    }
}

fn default_assistant_name() -> String {
    "Suriel".to_string()
}
fn default_refusal() -> String {
    "Sorry, that information is not in the current knowledge base.".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Check cross-field constraints that serde defaults cannot express.
pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.chunk_overlap ({}) must be < chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    if config.retrieval.k_documents < 1 {
        bail!("retrieval.k_documents must be >= 1");
    }

    if !(0.0..=2.0).contains(&config.generation.temperature) {
        bail!("generation.temperature must be in [0.0, 2.0]");
    }
    if config.generation.model.trim().is_empty() {
        bail!("generation.model must not be empty");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "local" | "hash" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, local, hash, openai, or ollama.",
            other
        ),
    }

    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }

    Ok(())
}
