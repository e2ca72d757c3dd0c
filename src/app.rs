//! Wiring: one [`App`] per process, shared by the CLI and the HTTP server.

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;

use faq_harness_core::embedding::Embedder;
use faq_harness_core::router::{Capabilities, TurnRouter};
use faq_harness_core::traits::Generator;

use crate::admin::DocumentAdmin;
use crate::catalog::SqliteCatalog;
use crate::chat::ChatService;
use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::escalation::LoggingEscalator;
use crate::generation::create_generator;
use crate::history::SqliteHistory;
use crate::index::{IndexManager, IndexRetriever};
use crate::migrate;
use crate::stats::SqliteUsage;

pub struct App {
    pub config: Config,
    pub pool: SqlitePool,
    pub catalog: SqliteCatalog,
    pub history: SqliteHistory,
    pub usage: SqliteUsage,
    pub index: Arc<IndexManager>,
    pub chat: ChatService,
    pub admin: DocumentAdmin,
}

impl App {
    /// Build from configuration, with the configured providers.
    pub async fn open(config: Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        Self::with_providers(config, embedder, generator).await
    }

    /// Build with explicit embedding and generation providers.
    pub async fn with_providers(
        config: Config,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        let pool = db::connect(&config).await?;
        migrate::apply(&pool).await?;

        let catalog = SqliteCatalog::new(pool.clone());
        let history = SqliteHistory::new(pool.clone());
        let usage = SqliteUsage::new(pool.clone());
        let index = Arc::new(IndexManager::new(
            config.index.dir.clone(),
            config.chunking.max_tokens,
            config.embedding.batch_size,
            embedder,
        ));

        let shared_catalog = Arc::new(catalog.clone());
        let router = TurnRouter::new(
            config.router_config(),
            Capabilities {
                retriever: Arc::new(IndexRetriever::new(shared_catalog.clone(), index.clone())),
                generator,
                escalator: Arc::new(LoggingEscalator),
                catalog: shared_catalog,
            },
        );
        let chat = ChatService::new(
            router,
            Arc::new(history.clone()),
            usage.clone(),
            config.context.history_limit,
        );
        let admin = DocumentAdmin::new(catalog.clone(), index.clone(), &config.index);

        Ok(Self {
            config,
            pool,
            catalog,
            history,
            usage,
            index,
            chat,
            admin,
        })
    }
}
