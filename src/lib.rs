//! # Decision Twin
//!
//! An expert-persona decision assistant: a curated corpus (web articles,
//! video transcripts, local notes) is chunked, embedded and stored in
//! SQLite; questions are answered by a generation model constrained to a
//! closed action set and grounded in the retrieved chunks; an LLM judge
//! benchmarks RAG on/off against two prompt versions.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────┐
//! │  Sources    │──▶│  Pipeline   │──▶│  SQLite  │
//! │ Web/YT/File │   │ Chunk+Embed │   │ vectors  │
//! └─────────────┘   └─────────────┘   └────┬─────┘
//!                                          │
//!                      ┌───────────────────┤
//!                      ▼                   ▼
//!                 ┌──────────┐       ┌──────────┐
//!                 │   CLI    │       │   HTTP   │
//!                 │  (twin)  │       │  (axum)  │
//!                 └──────────┘       └──────────┘
//! ```
//!
//! Runtime-free logic (models, chunking, retrieval, prompts, judge parsing,
//! report aggregation) lives in the `decision-twin-core` crate; this crate
//! supplies configuration, providers, persistence and the command surface.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`retry`] | Bounded exponential backoff for provider calls |
//! | [`embedding`] | Embedding providers and the batching adapter |
//! | [`generation`] | Generation providers and the retrying adapter |
//! | [`db`] / [`migrate`] | SQLite connection and schema |
//! | [`sqlite_store`] | SQLite knowledge store |
//! | [`extract`] | HTML and transcript text extraction |
//! | [`sources`] | Source fetching |
//! | [`ingest`] | Ingestion pipeline |
//! | [`app`] | Component wiring from config |
//! | [`ask`] | `twin ask` / `twin retrieve` |
//! | [`evaluate`] | Evaluation runs and report writing |
//! | [`export`] | Bulk export and import |
//! | [`stats`] | Knowledge base statistics |
//! | [`server`] | HTTP API |

pub mod app;
pub mod ask;
pub mod config;
pub mod db;
pub mod embedding;
pub mod evaluate;
pub mod export;
pub mod extract;
pub mod generation;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod retry;
pub mod server;
pub mod sources;
pub mod sqlite_store;
pub mod stats;
