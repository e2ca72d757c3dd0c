//! Shared fixtures: a keyword embedder, scripted generators, and an `App`
//! over a temp directory.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use faq_harness::app::App;
use faq_harness::config::load_config;
use faq_harness_core::embedding::Embedder;
use faq_harness_core::models::Turn;
use faq_harness_core::traits::Generator;

const VOCABULARY: &[&str] = &["refund", "shipping", "password", "warranty"];

/// One dimension per vocabulary word plus a small constant so no vector is
/// zero. Texts sharing no keyword score near 0.
#[derive(Default)]
pub struct KeywordEmbedder {
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let mut v: Vec<f32> = VOCABULARY
            .iter()
            .map(|w| lower.matches(w).count() as f32)
            .collect();
        v.push(0.01);
        v
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }
    fn dims(&self) -> usize {
        VOCABULARY.len() + 1
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Echoes the question and whether any FAQ context was supplied.
pub struct EchoGenerator;

#[async_trait]
impl Generator for EchoGenerator {
    async fn complete(
        &self,
        _system_instructions: &str,
        context: &str,
        history: &[Turn],
        user_input: &str,
    ) -> Result<String> {
        Ok(format!(
            "Generated: {} (context: {}, history: {})",
            user_input,
            !context.is_empty(),
            history.len()
        ))
    }
}

pub struct OfflineGenerator;

#[async_trait]
impl Generator for OfflineGenerator {
    async fn complete(
        &self,
        _system_instructions: &str,
        _context: &str,
        _history: &[Turn],
        _user_input: &str,
    ) -> Result<String> {
        bail!("model offline")
    }
}

pub struct TestEnv {
    pub tmp: TempDir,
    pub config_path: PathBuf,
    pub embedder: Arc<KeywordEmbedder>,
}

impl TestEnv {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let files = root.join("files");
        fs::create_dir_all(&files).unwrap();

        fs::write(
            files.join("refunds.md"),
            "# Refunds\n\nRefunds are issued within 14 days of a refund request.",
        )
        .unwrap();
        fs::write(
            files.join("shipping.txt"),
            "Shipping takes 3 to 5 business days. Express shipping is available.",
        )
        .unwrap();
        fs::write(
            files.join("accounts.md"),
            "Reset your password from the login page. The password link expires after one hour.",
        )
        .unwrap();

        let config = format!(
            r#"[db]
path = "{root}/data/faq.sqlite"

[index]
dir = "{root}/data/index"
uploads_dir = "{root}/data/uploads"
max_upload_bytes = 1024

[retrieval]
min_score = 0.5
"#,
            root = root.display()
        );
        let config_path = root.join("faq.toml");
        fs::write(&config_path, config).unwrap();

        Self {
            tmp,
            config_path,
            embedder: Arc::new(KeywordEmbedder::default()),
        }
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.tmp.path().join("files").join(name)
    }

    pub fn index_file(&self) -> PathBuf {
        self.tmp.path().join("data/index/index.json")
    }

    pub async fn app(&self) -> App {
        self.app_with(Arc::new(EchoGenerator)).await
    }

    pub async fn app_with(&self, generator: Arc<dyn Generator>) -> App {
        let config = load_config(&self.config_path).unwrap();
        App::with_providers(config, self.embedder.clone(), generator)
            .await
            .unwrap()
    }
}

/// Upload and activate each named fixture file; returns their ids.
pub async fn add_active(app: &App, env: &TestEnv, names: &[&str]) -> Vec<i64> {
    let mut ids = Vec::new();
    for name in names {
        let created = app.admin.upload(&env.file(name)).await.unwrap();
        let id = created.value.document.id;
        app.admin.set_active(id, true).await.unwrap();
        ids.push(id);
    }
    ids
}
