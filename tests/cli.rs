//! Integration tests for the `docent` binary.
//!
//! Each test writes a document and config into a temp directory and runs
//! the compiled binary against it.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docent_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("docent");
    path
}

/// Minimal valid PDF with one page of text, offsets computed so the xref
/// table is correct.
fn minimal_pdf_with_phrase() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(b"4 0 obj << /Length 44 >> stream\nBT /F1 12 Tf 100 700 Td (one time pad) Tj ET\nendstream endobj\n");
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

fn setup_env(document_name: &str, contents: &[u8]) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    fs::write(root.join(document_name), contents).unwrap();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_path = config_dir.join("docent.toml");
    fs::write(
        &config_path,
        format!(
            r#"
[document]
path = "{doc}"

[chunking]
chunk_words = 12
overlap_words = 3

[index]
cache_path = "{cache}"

[model]
api_token_env = "DOCENT_CLI_TEST_TOKEN_UNSET"
"#,
            doc = root.join(document_name).display(),
            cache = root.join("cache/index.json").display(),
        ),
    )
    .unwrap();

    (tmp, config_path)
}

fn run_docent(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(docent_binary())
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("DATABRICKS_TOKEN")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docent: {}", e));
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

const NOTES: &str = "The one-time pad encrypts by XOR with a random key as long as the message.\x0c\
Reusing the key even once lets an attacker XOR two ciphertexts and cancel the pad.";

#[test]
fn test_index_builds_then_reuses_snapshot() {
    let (tmp, config) = setup_env("notes.txt", NOTES.as_bytes());

    let (stdout, stderr, ok) = run_docent(&config, &["index"]);
    assert!(ok, "index failed: {}", stderr);
    assert!(stdout.starts_with("Index built:"), "got: {}", stdout);
    assert!(tmp.path().join("cache/index.json").exists());

    let (stdout, _, ok) = run_docent(&config, &["index"]);
    assert!(ok);
    assert!(stdout.starts_with("Index cache:"), "got: {}", stdout);

    let (stdout, _, ok) = run_docent(&config, &["index", "--rebuild"]);
    assert!(ok);
    assert!(stdout.starts_with("Index built:"), "got: {}", stdout);
}

#[test]
fn test_search_prints_ranked_passages() {
    let (_tmp, config) = setup_env("notes.txt", NOTES.as_bytes());

    let (stdout, stderr, ok) = run_docent(&config, &["search", "reusing the key", "--limit", "1"]);
    assert!(ok, "search failed: {}", stderr);
    assert!(stdout.starts_with("1. ["), "got: {}", stdout);
    assert!(stdout.contains("notes (book) - page 2"), "got: {}", stdout);
    assert!(!stdout.contains("2. ["));

    let (stdout, _, ok) = run_docent(&config, &["search", "zebra"]);
    assert!(ok);
    assert_eq!(stdout.trim(), "No results.");
}

#[test]
fn test_tools_lists_builtins() {
    let (_tmp, config) = setup_env("notes.txt", NOTES.as_bytes());
    let (stdout, _, ok) = run_docent(&config, &["tools"]);
    assert!(ok);
    for name in ["web_search", "summarize_text", "sample_crypto_helper"] {
        assert!(stdout.contains(name), "missing {} in {}", name, stdout);
    }
}

#[test]
fn test_ask_without_model_settings_fails() {
    let (_tmp, config) = setup_env("notes.txt", NOTES.as_bytes());
    let (_, stderr, ok) = run_docent(&config, &["ask", "what is a pad?"]);
    assert!(!ok);
    assert!(stderr.contains("Missing model settings"), "got: {}", stderr);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, ok) = run_docent(&tmp.path().join("nope.toml"), &["index"]);
    assert!(!ok);
    assert!(stderr.contains("Failed to read config file"), "got: {}", stderr);
}

#[test]
fn test_missing_document_gives_empty_index() {
    let (tmp, config) = setup_env("notes.txt", NOTES.as_bytes());
    fs::remove_file(tmp.path().join("notes.txt")).unwrap();
    let (stdout, _, ok) = run_docent(&config, &["index"]);
    assert!(ok);
    assert!(stdout.starts_with("Index empty: 0 chunks"), "got: {}", stdout);
}

#[test]
fn test_pdf_document_indexes() {
    let (_tmp, config) = setup_env("crypto.pdf", &minimal_pdf_with_phrase());
    let (stdout, stderr, ok) = run_docent(&config, &["index"]);
    assert!(ok, "index failed: {}", stderr);
    // text recovery depends on the font handling in the PDF decoder
    assert!(
        stdout.starts_with("Index built:") || stdout.starts_with("Index empty:"),
        "got: {}",
        stdout
    );
}
