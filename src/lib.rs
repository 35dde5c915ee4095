//! # ragserve
//!
//! A retrieval-augmented question answering service for product FAQ and
//! documentation sets.
//!
//! Questions are accepted over HTTP, queued in SQLite, and answered by a
//! worker pool that runs a four-stage pipeline: vector retrieval,
//! cross-encoder reranking, optional web search, and context combination.
//! Every answer carries numbered citations back to the passages it used.
//! A filesystem watcher re-ingests the document directory after edits.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  POST /ask   ┌─────────┐  claim   ┌───────────┐
//! │  Client   │─────────────▶│ SQLite  │◀────────│  Workers   │
//! │          │◀─────────────│  queue   │  write   │ (pipeline) │
//! └──────────┘ GET /tasks/id └─────────┘          └─────┬─────┘
//!                                                       │ query
//! ┌──────────┐   debounce   ┌─────────┐   rebuild  ┌────▼─────┐
//! │ Watcher   │─────────────▶│ Ingest  │───────────▶│  SQLite   │
//! │ (notify)  │              │         │            │  vectors  │
//! └──────────┘              └─────────┘            └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ragd init                # create the database
//! ragd ingest              # index the document directory
//! ragd serve               # gateway + workers + watcher
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Environment configuration |
//! | [`models`] | Core data types |
//! | [`pipeline`] | Four-stage retrieval pipeline |
//! | [`cite`] | Citation assignment and prompt building |
//! | [`broker`] | Durable SQLite task queue |
//! | [`worker`] | Worker pool and task processing |
//! | [`server`] | HTTP gateway |
//! | [`ingest`] | Document scanning, chunking, embedding |
//! | [`watcher`] | Debounced filesystem re-ingest |
//! | [`store`] | SQLite vector store |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`rerank`] | Rerank provider abstraction |
//! | [`websearch`] | Web search provider and result normalization |
//! | [`llm`] | Answer generation provider |
//! | [`extract`] | Per-format text extraction |
//! | [`chunk`] | Text chunking |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod broker;
pub mod chunk;
pub mod cite;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod rerank;
pub mod server;
pub mod store;
pub mod watcher;
pub mod websearch;
pub mod worker;
