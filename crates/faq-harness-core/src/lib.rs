//! # FAQ Harness Core
//!
//! Pure logic for the FAQ Harness answer pipeline: data models, chunking,
//! the replaceable vector index, turn routing, context window trimming, and
//! source attribution.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. Every outside
//! capability (document catalog, history store, retrieval, generation,
//! escalation, embeddings) is reached through the traits in [`traits`] and
//! [`embedding`], so a turn is computable from its explicit inputs alone.

pub mod attribution;
pub mod chunk;
pub mod context_window;
pub mod embedding;
pub mod intent;
pub mod models;
pub mod router;
pub mod traits;
pub mod vector;
