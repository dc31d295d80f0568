//! # Suriel CLI (`suriel`)
//!
//! Grounded question answering over a private document collection, with
//! every exchange remembered for later questions.
//!
//! ## Usage
//!
//! ```bash
//! suriel --config ./config/suriel.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `suriel init` | Create the SQLite index and run schema migrations |
//! | `suriel ingest <file>...` | Index PDF, DOCX, TXT or Markdown files |
//! | `suriel ask "<question>"` | One grounded answer, recorded as memory |
//! | `suriel search "<query>"` | Inspect raw retrieval for one channel |
//! | `suriel count` | Number of records in the index |
//! | `suriel serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use suriel::config::{self, Config};
use suriel::engine::RagEngine;
use suriel::index::VectorIndex;
use suriel::models::Channel;
use suriel::store::Filter;
use suriel::{ingest, logging, server};

/// Suriel: a retrieval-augmented assistant that answers only from your documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Credentials (e.g. `GROQ_API_KEY`) may be placed in a `.env` file.
#[derive(Parser)]
#[command(name = "suriel", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/suriel.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the index database. Idempotent.
    Init,

    /// Ingest local documents into the knowledge base.
    ///
    /// Each file is chunked, embedded and written atomically; a failing file
    /// is reported and does not stop the others.
    Ingest {
        /// Files to ingest (.pdf, .docx, .txt, .md).
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Ask one question and print the grounded answer.
    Ask {
        question: String,
    },

    /// Show what retrieval returns for a query on one channel.
    Search {
        query: String,

        /// Channel to search: `documents` or `memory`.
        #[arg(long, default_value = "documents")]
        channel: Channel,

        /// Maximum number of results.
        #[arg(long, default_value_t = 9)]
        limit: usize,
    },

    /// Print the number of records in the index.
    Count,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let index = VectorIndex::open(&cfg).await?;
            index.close().await?;
            println!("Index initialized at {}", cfg.db.path.display());
        }
        Commands::Ingest { files } => run_ingest(&cfg, &files).await?,
        Commands::Ask { question } => {
            let engine = RagEngine::open(&cfg).await?;
            let answer = engine.chat(&question).await;
            engine.close().await?;
            println!("{}", answer?);
        }
        Commands::Search {
            query,
            channel,
            limit,
        } => run_search(&cfg, &query, channel, limit).await?,
        Commands::Count => {
            let index = VectorIndex::open(&cfg).await?;
            println!("{}", index.count().await?);
            index.close().await?;
        }
        Commands::Serve => server::run_server(&cfg).await?,
    }

    Ok(())
}

async fn run_ingest(cfg: &Config, files: &[PathBuf]) -> anyhow::Result<()> {
    let index = VectorIndex::open(cfg).await?;
    let mut failed = 0usize;

    for path in files {
        match ingest::ingest_file(&index, &cfg.chunking, path).await {
            Ok(n) => println!("  {} → {} chunks", path.display(), n),
            Err(e) => {
                failed += 1;
                eprintln!("  {} failed: {}", path.display(), e);
            }
        }
    }

    println!("ingest complete");
    println!("  files: {}", files.len());
    println!("  failed: {}", failed);
    println!("  index size: {}", index.count().await?);
    index.close().await?;

    if failed > 0 {
        anyhow::bail!("{} of {} files failed to ingest", failed, files.len());
    }
    Ok(())
}

async fn run_search(
    cfg: &Config,
    query: &str,
    channel: Channel,
    limit: usize,
) -> anyhow::Result<()> {
    let index = VectorIndex::open(cfg).await?;
    let filter = match channel {
        Channel::Document => Filter::channel_ne(Channel::Memory),
        Channel::Memory => Filter::channel_eq(Channel::Memory),
    };
    let hits = index.search(query, limit, Some(&filter)).await?;
    index.close().await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} ({})",
            i + 1,
            hit.score,
            hit.metadata.source,
            hit.metadata.channel
        );
        let preview: String = hit.text.chars().take(240).collect();
        println!("    {}", preview.replace('\n', " "));
    }
    Ok(())
}
