//! # Decision Twin Core
//!
//! Runtime-free logic for Decision Twin: data models, chunking, the
//! knowledge store abstraction, retrieval, prompt construction, answer
//! orchestration, and evaluation scoring.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. External
//! capabilities (embedding, generation, vector storage) are reached through
//! the traits in [`embedding`], [`generation`], and [`store`]; the
//! `decision-twin` application crate supplies the concrete providers and the
//! retry/pacing adapters around them.

pub mod answer;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod judge;
pub mod models;
pub mod prompt;
pub mod report;
pub mod retrieve;
pub mod spec;
pub mod store;
pub mod validate;

pub use error::{ProviderError, Result, TwinError};
