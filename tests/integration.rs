//! End-to-end tests: the CLI binary, the SQLite-backed engine and the HTTP
//! server. All of them use the offline `hash` embedder and, where an answer
//! is needed, a scripted generation client or a loopback mock provider, so
//! nothing leaves the machine.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;

use suriel::config::Config;
use suriel::engine::RagEngine;
use suriel::error::Result as RagResult;
use suriel::generation::{ChatCompletionsClient, GenerationClient};
use suriel::index::VectorIndex;
use suriel::models::Channel;
use suriel::retrieval::Retriever;
use suriel::server::run_server_with_engine;
use suriel::store::Filter;

// ============ Helpers ============

fn write_config(root: &Path, port: u16) -> PathBuf {
    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_path = config_dir.join("suriel.toml");
    fs::write(
        &config_path,
        format!(
            r#"
[db]
path = "{}"

[chunking]
chunk_size = 200
chunk_overlap = 20

[embedding]
provider = "hash"
dims = 256

[server]
bind = "127.0.0.1:{}"
"#,
            root.join("data").join("suriel.sqlite").display(),
            port
        ),
    )
    .unwrap();
    config_path
}

fn load(config_path: &Path) -> Config {
    suriel::config::load_config(config_path).unwrap()
}

fn run_suriel(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_suriel"))
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run suriel binary");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

/// Replies with a fixed string.
struct Scripted(String);

#[async_trait]
impl GenerationClient for Scripted {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, _prompt: &str, _system: &str) -> RagResult<String> {
        Ok(self.0.clone())
    }
}

async fn open_engine(cfg: &Config, reply: &str) -> Arc<RagEngine> {
    let index = Arc::new(VectorIndex::open(cfg).await.unwrap());
    Arc::new(RagEngine::new(
        cfg,
        index,
        Arc::new(Scripted(reply.to_string())),
    ))
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

/// Minimal one-page PDF showing `phrase`, with correct stream length and xref.
fn minimal_pdf(phrase: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            content.len(),
            content
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

// ============ CLI ============

#[test]
fn test_init_idempotent_and_count_zero() {
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path(), 0);

    let (stdout, stderr, ok) = run_suriel(&config_path, &["init"]);
    assert!(ok, "init failed: {} {}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    let (_, _, ok) = run_suriel(&config_path, &["init"]);
    assert!(ok);

    let (stdout, _, ok) = run_suriel(&config_path, &["count"]);
    assert!(ok);
    assert_eq!(stdout.trim(), "0");
}

#[test]
fn test_cli_ingest_then_search_documents() {
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path(), 0);
    let doc = tmp.path().join("vault.md");
    fs::write(&doc, "# Vault\n\nThe access code is ZEBRA123.\n").unwrap();

    let (stdout, stderr, ok) = run_suriel(&config_path, &["ingest", doc.to_str().unwrap()]);
    assert!(ok, "ingest failed: {} {}", stdout, stderr);
    assert!(stdout.contains("index size: 1"), "{}", stdout);

    let (stdout, _, ok) = run_suriel(
        &config_path,
        &["search", "ZEBRA123", "--channel", "documents"],
    );
    assert!(ok);
    assert!(stdout.contains("ZEBRA123"));
    assert!(stdout.contains("vault.md"));

    let (stdout, _, ok) = run_suriel(&config_path, &["search", "ZEBRA123", "--channel", "memory"]);
    assert!(ok);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_cli_ingest_rejects_unsupported_file() {
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path(), 0);
    let img = tmp.path().join("photo.png");
    fs::write(&img, b"\x89PNG\r\n").unwrap();

    let (_, stderr, ok) = run_suriel(&config_path, &["ingest", img.to_str().unwrap()]);
    assert!(!ok);
    assert!(stderr.contains("unsupported document type"), "{}", stderr);

    let (stdout, _, _) = run_suriel(&config_path, &["count"]);
    assert_eq!(stdout.trim(), "0");
}

// ============ Engine over SQLite ============

#[tokio::test]
async fn test_document_retrieval_and_memory_recall() {
    let tmp = TempDir::new().unwrap();
    let cfg = load(&write_config(tmp.path(), 0));
    let engine = open_engine(&cfg, "A1").await;

    let text = "Operations handbook.\n\nThe vault access code is ZEBRA123. \
                Rotate it every quarter.\n\nUnrelated notes about the cafeteria menu.";
    engine
        .ingest_document(
            "handbook.txt",
            text.as_bytes().to_vec(),
            suriel::extract::DocumentKind::PlainText,
        )
        .await
        .unwrap();

    let retriever = Retriever::from_config(&cfg.retrieval);
    let ctx = retriever
        .retrieve(engine.index(), "What is ZEBRA123?")
        .await
        .unwrap();
    assert!(ctx.documents.iter().any(|d| d.contains("ZEBRA123")));
    assert!(ctx.memories.is_empty());

    assert_eq!(engine.chat("Q1").await.unwrap(), "A1");

    let ctx = retriever.retrieve(engine.index(), "Q1").await.unwrap();
    assert!(ctx
        .memories
        .iter()
        .any(|m| m.contains("Q1") && m.contains("A1")));

    // Channels never share records.
    let (docs, mems) = retriever
        .retrieve_hits(engine.index(), "Q1 ZEBRA123")
        .await
        .unwrap();
    let doc_ids: HashSet<_> = docs.iter().map(|h| h.id.clone()).collect();
    assert!(mems.iter().all(|h| !doc_ids.contains(&h.id)));
    engine.close().await.unwrap();
}

#[tokio::test]
async fn test_index_survives_restart() {
    let tmp = TempDir::new().unwrap();
    let cfg = load(&write_config(tmp.path(), 0));

    {
        let engine = open_engine(&cfg, "remembered answer").await;
        engine.chat("first question").await.unwrap();
        engine.close().await.unwrap();
    }

    let index = VectorIndex::open(&cfg).await.unwrap();
    assert_eq!(index.count_channel(Channel::Memory).await.unwrap(), 1);
    let hits = index
        .search("first question", 6, Some(&Filter::channel_eq(Channel::Memory)))
        .await
        .unwrap();
    assert!(hits[0].text.contains("remembered answer"));
    index.close().await.unwrap();
}

#[tokio::test]
async fn test_reopen_with_other_embedding_model_fails() {
    let tmp = TempDir::new().unwrap();
    let mut cfg = load(&write_config(tmp.path(), 0));
    VectorIndex::open(&cfg).await.unwrap().close().await.unwrap();

    cfg.embedding.dims = Some(128);
    let err = VectorIndex::open(&cfg).await.err().unwrap();
    assert!(err.to_string().contains("embedding model"));
}

// ============ HTTP ============

#[tokio::test]
async fn test_http_upload_chat_and_count() {
    let port = find_free_port();
    let tmp = TempDir::new().unwrap();
    let cfg = load(&write_config(tmp.path(), port));
    let engine = open_engine(&cfg, "The code is ZEBRA123.").await;

    let server_cfg = cfg.clone();
    let server_engine = Arc::clone(&engine);
    let _server = tokio::spawn(async move {
        run_server_with_engine(&server_cfg, server_engine).await.ok();
    });
    wait_for_server(port).await;

    let client = reqwest::Client::new();
    let base = format!("http://127.0.0.1:{}", port);

    let count = |body: Value| body["count"].as_u64().unwrap();
    let before = count(
        client
            .get(format!("{}/count_index", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap(),
    );
    assert_eq!(before, 0);

    // Rejected upload leaves the index untouched.
    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(b"\x89PNG\r\n".to_vec())
            .file_name("photo.png")
            .mime_str("image/png")
            .unwrap(),
    );
    let resp = client
        .post(format!("{}/upload", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "invalid_input");

    // PDF upload adds exactly the reported number of chunks.
    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(minimal_pdf("vault code ZEBRA123"))
            .file_name("vault.pdf")
            .mime_str("application/pdf")
            .unwrap(),
    );
    let resp = client
        .post(format!("{}/upload", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["filename"], "vault.pdf");
    let chunks = body["chunks"].as_u64().unwrap();
    assert!(chunks >= 1);

    let after = count(
        client
            .get(format!("{}/count_index", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap(),
    );
    assert_eq!(after, before + chunks);

    // Chat answers and records one memory.
    let resp = client
        .post(format!("{}/chat", base))
        .json(&serde_json::json!({ "message": "What is the vault code?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["response"], "The code is ZEBRA123.");
    assert_eq!(
        engine.index().count_channel(Channel::Memory).await.unwrap(),
        1
    );

    // Empty message is a client error.
    let resp = client
        .post(format!("{}/chat", base))
        .json(&serde_json::json!({ "message": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

/// A chat-completions provider that rejects every call with HTTP 429.
async fn rate_limited_provider() -> String {
    use axum::{http::StatusCode, routing::post, Json, Router};

    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "error": { "message": "Rate limit reached for model", "type": "tokens" }
                })),
            )
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/v1", addr)
}

#[tokio::test]
async fn test_http_chat_reports_generation_failure() {
    let port = find_free_port();
    let tmp = TempDir::new().unwrap();
    let cfg = load(&write_config(tmp.path(), port));

    let provider = rate_limited_provider().await;
    let generator = ChatCompletionsClient::new(
        &provider,
        "test-key",
        "llama-3.1-8b-instant",
        0.0,
        std::time::Duration::from_secs(5),
    )
    .unwrap();
    let index = Arc::new(VectorIndex::open(&cfg).await.unwrap());
    let engine = Arc::new(RagEngine::new(&cfg, index, Arc::new(generator)));

    let server_cfg = cfg.clone();
    let server_engine = Arc::clone(&engine);
    let _server = tokio::spawn(async move {
        run_server_with_engine(&server_cfg, server_engine).await.ok();
    });
    wait_for_server(port).await;

    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{}/chat", port))
        .json(&serde_json::json!({ "message": "Is the launch on schedule?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "generation_failed");
    let message = body["error"]["message"].as_str().unwrap();
    assert!(message.contains("rate_limited"));
    assert!(message.contains("Rate limit reached for model"));
    assert_eq!(
        engine.index().count_channel(Channel::Memory).await.unwrap(),
        0
    );
}
