//! CLI command implementations. Results go to stdout; logs go to stderr.

use anyhow::Result;
use std::path::Path;

use faq_harness_core::models::{DocumentId, Turn};

use crate::admin::Mutation;
use crate::app::App;
use crate::config::Config;
use crate::index::IndexReport;
use crate::migrate;
use crate::stats::format_ts_relative;

/// Create the database schema and the data directories. Idempotent.
pub async fn run_init(config: &Config) -> Result<()> {
    migrate::run_migrations(config).await?;
    std::fs::create_dir_all(&config.index.dir)?;
    std::fs::create_dir_all(&config.index.uploads_dir)?;
    println!("Database initialized at {}", config.db.path.display());
    Ok(())
}

fn print_index(report: &IndexReport) {
    println!("index: {}", report.describe());
}

fn print_mutation<T>(verb: &str, id: DocumentId, name: &str, mutation: &Mutation<T>) {
    println!("{} document {} ({})", verb, id, name);
    print_index(&mutation.index);
}

pub async fn run_docs_add(app: &App, path: &Path) -> Result<()> {
    let created = app.admin.upload(path).await?;
    let doc = &created.value.document;
    print_mutation("added", doc.id, &doc.name, &created);
    println!("The document is inactive; run `faq docs activate {}` to use it.", doc.id);
    Ok(())
}

pub async fn run_docs_list(app: &App) -> Result<()> {
    let documents = app.admin.list().await?;
    if documents.is_empty() {
        println!("No documents.");
        return Ok(());
    }
    println!("{:>4}  {:<6}  {:<32}  {}", "ID", "ACTIVE", "NAME", "ADDED");
    for doc in &documents {
        println!(
            "{:>4}  {:<6}  {:<32}  {}",
            doc.id,
            if doc.active { "yes" } else { "no" },
            doc.name,
            format_ts_relative(doc.created_at)
        );
    }
    Ok(())
}

pub async fn run_docs_set_active(app: &App, id: DocumentId, active: bool) -> Result<()> {
    let updated = app.admin.set_active(id, active).await?;
    let doc = &updated.value.document;
    let verb = if active { "activated" } else { "deactivated" };
    print_mutation(verb, doc.id, &doc.name, &updated);
    Ok(())
}

pub async fn run_docs_delete(app: &App, id: DocumentId) -> Result<()> {
    let deleted = app.admin.delete(id).await?;
    let doc = &deleted.value.deleted;
    print_mutation("deleted", doc.id, &doc.name, &deleted);
    Ok(())
}

pub async fn run_index_rebuild(app: &App) -> Result<()> {
    print_index(&app.admin.rebuild_index().await?);
    Ok(())
}

pub async fn run_index_status(app: &App) -> Result<()> {
    match app.index.status().await? {
        Some(meta) => {
            println!("Index:      {}", app.index.dir().display());
            println!("Model:      {} ({} dims)", meta.model, meta.dims);
            println!("Chunks:     {}", meta.chunk_count);
            println!("Documents:  {}", meta.document_count);
            println!("Built:      {}", format_ts_relative(meta.built_at_ms / 1000));
        }
        None => println!("Index not built."),
    }
    Ok(())
}

pub async fn run_ask(app: &App, conversation_id: &str, text: &str) -> Result<()> {
    let reply = app.chat.chat(conversation_id, text).await?;
    println!("{}", reply.response);
    println!();
    println!(
        "[conversation {} | state {}]",
        conversation_id,
        reply.state.label()
    );
    Ok(())
}

pub async fn run_history(app: &App, conversation_id: &str) -> Result<()> {
    let turns = app.history.fetch_all(conversation_id).await?;
    if turns.is_empty() {
        println!("No turns for conversation {}.", conversation_id);
        return Ok(());
    }
    for turn in &turns {
        print_turn(turn);
    }
    Ok(())
}

fn print_turn(turn: &Turn) {
    println!("Human: {}", turn.input);
    println!("AI: {}", turn.output);
    if !turn.document_ids.is_empty() {
        println!("   (documents: {:?})", turn.document_ids);
    }
    println!();
}
