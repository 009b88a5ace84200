//! archivist - incremental markdown indexing into a pgvector store
//!
//! Scans a markdown corpus, detects adds, modifications, and deletions
//! against a persisted indexing history, chunks and embeds the changed
//! documents, and reconciles the vector store one file at a time.

pub mod chunk;
pub mod config;
pub mod detect;
pub mod document;
pub mod embed;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod reconcile;
pub mod scan;
pub mod schedule;
pub mod stats;
pub mod store;
pub mod sync;

pub use error::{Error, Result};
