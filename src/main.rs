//! # FAQ Harness CLI (`faq`)
//!
//! ## Usage
//!
//! ```bash
//! faq --config ./config/faq.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `faq init` | Create the SQLite database and data directories |
//! | `faq docs add <path>` | Upload a `.pdf`, `.md` or `.txt` document (inactive) |
//! | `faq docs list` | List documents |
//! | `faq docs activate <id>` | Include a document in the index |
//! | `faq docs deactivate <id>` | Exclude a document from the index |
//! | `faq docs delete <id>` | Delete a document and its file |
//! | `faq index rebuild` | Force an index rebuild |
//! | `faq index status` | Show the on-disk index |
//! | `faq ask "<text>"` | Route one turn of a conversation |
//! | `faq history <id>` | Print a conversation |
//! | `faq stats` | Usage analytics |
//! | `faq serve` | Start the HTTP server |
//!
//! Logs go to stderr and honor `RUST_LOG` (default `info`).

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use faq_harness::app::App;
use faq_harness::{commands, config, server, stats};

/// FAQ Harness: retrieval-augmented customer-support answers with
/// consent-gated generation and human handoff.
#[derive(Parser)]
#[command(
    name = "faq",
    about = "FAQ Harness: retrieval-augmented customer-support answers",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/faq.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and data directories.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Manage knowledge-base documents.
    Docs {
        #[command(subcommand)]
        action: DocsAction,
    },

    /// Inspect or rebuild the semantic index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Send one message and print the reply.
    Ask {
        /// The message text.
        text: String,

        /// Conversation to continue. A new one is started when omitted.
        #[arg(long)]
        conversation: Option<String>,
    },

    /// Print a conversation's full history.
    History {
        /// Conversation id.
        conversation: String,
    },

    /// Print document usage and conversation activity.
    Stats,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum DocsAction {
    /// Copy a file into the uploads directory and register it (inactive).
    Add {
        path: PathBuf,
    },
    List,
    Activate {
        id: i64,
    },
    Deactivate {
        id: i64,
    },
    /// Delete the document and its uploaded file.
    Delete {
        id: i64,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Rebuild from the currently active documents.
    Rebuild,
    Status,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            commands::run_init(&cfg).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        command => {
            let app = App::open(cfg).await?;
            match command {
                Commands::Docs { action } => match action {
                    DocsAction::Add { path } => commands::run_docs_add(&app, &path).await?,
                    DocsAction::List => commands::run_docs_list(&app).await?,
                    DocsAction::Activate { id } => {
                        commands::run_docs_set_active(&app, id, true).await?
                    }
                    DocsAction::Deactivate { id } => {
                        commands::run_docs_set_active(&app, id, false).await?
                    }
                    DocsAction::Delete { id } => commands::run_docs_delete(&app, id).await?,
                },
                Commands::Index { action } => match action {
                    IndexAction::Rebuild => commands::run_index_rebuild(&app).await?,
                    IndexAction::Status => commands::run_index_status(&app).await?,
                },
                Commands::Ask { text, conversation } => {
                    let conversation =
                        conversation.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                    commands::run_ask(&app, &conversation, &text).await?;
                }
                Commands::History { conversation } => {
                    commands::run_history(&app, &conversation).await?;
                }
                Commands::Serve => {
                    server::run_server(app).await?;
                }
                Commands::Init | Commands::Stats => {}
            }
        }
    }

    Ok(())
}
