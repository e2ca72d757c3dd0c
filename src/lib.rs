//! # FAQ Harness
//!
//! A customer-support chat backend. Answers questions from an admin-curated
//! knowledge base, asks before falling back to free-form generation, and
//! hands off to a human on request.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ Admin (docs) │──▶│ IndexManager │──▶│ index.json  │
//! │ upload/toggle│   │ chunk+embed  │   │ + fs2 lock  │
//! └──────────────┘   └──────┬───────┘   └─────────────┘
//!                           │ IndexRetriever
//!                           ▼
//! ┌──────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ CLI / HTTP   │──▶│ ChatService  │──▶│ TurnRouter  │ (faq-harness-core)
//! │ (faq, axum)  │   │ history+stats│   │ gate/generate/handoff
//! └──────────────┘   └──────────────┘   └─────────────┘
//! ```
//!
//! The routing, attribution and context-window logic lives in
//! `faq-harness-core`; this crate supplies its capabilities: SQLite storage,
//! the on-disk index, embedding and generation providers, and the CLI and
//! HTTP surfaces.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`app`] | Component wiring |
//! | [`catalog`] | Document catalog (SQLite) |
//! | [`history`] | Conversation history (SQLite) |
//! | [`index`] | Document index manager |
//! | [`extract`] | PDF / text extraction |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Text-generation providers |
//! | [`escalation`] | Human handoff |
//! | [`chat`] | Chat service |
//! | [`admin`] | Document administration |
//! | [`stats`] | Usage analytics |
//! | [`server`] | HTTP server |
//! | [`commands`] | CLI commands |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod admin;
pub mod app;
pub mod catalog;
pub mod chat;
pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod escalation;
pub mod extract;
pub mod generation;
pub mod history;
pub mod index;
pub mod migrate;
mod retry;
pub mod server;
pub mod stats;
