//! # docent
//!
//! Grounded question answering over a single document.
//!
//! docent splits a document into overlapping word windows, indexes them
//! with TF-IDF, and answers questions by sending the best-matching passages
//! to a chat-completion model. The model may request one round of local
//! tool calls (web search, summarization, ...) before it answers. Every
//! answer ends with a `Sources:` line computed from the passages actually
//! used.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌───────────────┐
//! │ Document │──▶│  Chunk   │──▶│  TF-IDF index │◀──▶ JSON snapshot
//! │ PDF/text │   │ windows  │   │   (corpus)    │
//! └──────────┘   └──────────┘   └──────┬────────┘
//!                                      │ top-k
//!                                      ▼
//!                 ┌───────────┐   ┌─────────┐   ┌──────────┐
//!                 │   tools   │◀─▶│  agent  │◀─▶│  model   │
//!                 └───────────┘   └────┬────┘   └──────────┘
//!                                      │
//!                           ┌──────────┴─────────┐
//!                           ▼                    ▼
//!                      ┌─────────┐         ┌──────────┐
//!                      │   CLI   │         │   HTTP   │
//!                      │(docent) │         │  (axum)  │
//!                      └─────────┘         └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docent index                    # build or reuse the index snapshot
//! docent search "one-time pad"    # inspect retrieval
//! docent ask "Why is key reuse fatal?"
//! docent serve                    # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | Page text extraction |
//! | [`chunk`] | Word-window chunking |
//! | [`index`] | TF-IDF index and snapshots |
//! | [`corpus`] | Load-or-build pipeline |
//! | [`tools`] | Tool trait, registry, built-ins |
//! | [`web_search`] | Web search client |
//! | [`llm`] | Model client |
//! | [`agent`] | Answer loop |
//! | [`session`] | Conversation memory |
//! | [`server`] | HTTP API |

pub mod agent;
pub mod chunk;
pub mod config;
pub mod corpus;
pub mod extract;
pub mod index;
pub mod llm;
pub mod models;
pub mod server;
pub mod session;
pub mod tools;
pub mod web_search;
