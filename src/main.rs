//! # docent CLI
//!
//! ## Usage
//!
//! ```bash
//! docent --config ./config/docent.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docent index` | Build the index, or reuse a valid snapshot |
//! | `docent search "<query>"` | Show the best-matching passages |
//! | `docent ask "<query>"` | Answer a question with the model |
//! | `docent tools` | List tools declared to the model |
//! | `docent serve` | Start the HTTP API |
//!
//! Logs go to stderr (`RUST_LOG`, default `warn,docent=info`); command
//! output goes to stdout.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docent::agent::Agent;
use docent::config::{self, Config};
use docent::corpus::{Corpus, Retriever};
use docent::server;
use docent::tools::ToolRegistry;
use docent::web_search::WebSearchClient;

/// Grounded question answering over a single document.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "docent",
    about = "docent: grounded question answering over a single document",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docent.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the passage index, reusing the snapshot when the document is unchanged.
    Index {
        /// Ignore the snapshot and rebuild from the document.
        #[arg(long)]
        rebuild: bool,
    },

    /// Show the passages that best match a query.
    Search {
        query: String,

        /// Maximum number of passages (defaults to `[retrieval].top_k`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Answer a question using the document, tools and the model.
    Ask {
        query: String,

        /// Do not let the model use web search.
        #[arg(long)]
        no_search: bool,

        /// Print the full run (trace, context) as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List the tools declared to the model.
    Tools,

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,docent=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Index { rebuild } => run_index(&cfg, rebuild)?,
        Commands::Search { query, limit } => run_search(&cfg, &query, limit)?,
        Commands::Ask {
            query,
            no_search,
            json,
        } => run_ask(&cfg, &query, !no_search, json).await?,
        Commands::Tools => run_tools(&cfg)?,
        Commands::Serve => server::run_server(&cfg).await?,
    }

    Ok(())
}

fn run_index(cfg: &Config, rebuild: bool) -> anyhow::Result<()> {
    let corpus = Corpus::from_config(cfg)?;
    if rebuild {
        corpus.refresh(true)?;
    }
    let (index, origin) = corpus.state();
    println!(
        "Index {}: {} chunks, {} terms ({})",
        origin,
        index.len(),
        index.vocabulary_len(),
        corpus.document().display()
    );
    Ok(())
}

fn run_search(cfg: &Config, query: &str, limit: Option<usize>) -> anyhow::Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let corpus = Corpus::from_config(cfg)?;
    let hits = corpus.retrieve(query, limit.unwrap_or(cfg.retrieval.top_k));
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.4}] {} ({})",
            i + 1,
            hit.score,
            hit.chunk.source,
            hit.chunk.id
        );
        println!("   {}", snippet(&hit.chunk.text, 160));
    }
    Ok(())
}

async fn run_ask(cfg: &Config, query: &str, allow_search: bool, json: bool) -> anyhow::Result<()> {
    let agent_cfg = cfg.clone();
    let agent = tokio::task::spawn_blocking(move || Agent::from_config(&agent_cfg)).await??;
    let run = agent.run(query, allow_search, &[]).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        println!("{}", run.answer);
    }
    Ok(())
}

fn run_tools(cfg: &Config) -> anyhow::Result<()> {
    let search = WebSearchClient::new(
        cfg.web_search.endpoint.clone(),
        None,
        Duration::from_secs(cfg.web_search.timeout_secs),
    )?;
    let tools = ToolRegistry::with_builtins(search);
    for schema in tools.schemas() {
        println!("{:<22} {}", schema.function.name, schema.function.description);
    }
    Ok(())
}

fn snippet(text: &str, max_chars: usize) -> String {
    docent::tools::truncate_chars(text, max_chars)
}
