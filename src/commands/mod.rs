//! Operations behind every page and CLI action. Each function takes the
//! [`App`] explicitly; rendering lives in [`crate::view`].

pub mod analytics;
pub mod chat;
pub mod lai;
pub mod library;
pub mod search;
pub mod settings;

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::Database;
use crate::embedding::{EmbeddingProvider, OpenAiEmbedder};
use crate::error::AppError;
use crate::index::{IndexClient, VectorIndex};
use crate::llm::openai::OpenAiConfig;
use crate::rag::{AnswerEngine, RagSettings};

/// Everything a session needs, built once from [`AppConfig`].
pub struct App {
    pub config: AppConfig,
    pub db: Database,
    engine: AnswerEngine,
}

impl App {
    /// Open the stores and embed with the configured OpenAI-compatible endpoint.
    pub fn open(config: AppConfig) -> Result<Self, AppError> {
        let embedder = OpenAiEmbedder::new(
            OpenAiConfig {
                api_key: config.openai.api_key.clone().unwrap_or_default(),
                base_url: config.openai.base_url.clone(),
            },
            config.embedding_model.clone(),
        );
        Self::with_embedder(config, Arc::new(embedder))
    }

    pub fn with_embedder(
        config: AppConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, AppError> {
        config.validate()?;
        config.ensure_dirs()?;

        let db = Database::new(&config.db_path)?;
        let store = VectorIndex::open(&config.index_path())?;
        let already_indexed: Vec<String> = store.sources()?.into_iter().map(|(s, _)| s).collect();

        let mut engine = AnswerEngine::new(IndexClient::new(store, embedder), RagSettings::from(&config));
        engine.session_mut().mark_indexed(already_indexed);

        Ok(Self { config, db, engine })
    }

    pub fn engine(&self) -> &AnswerEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut AnswerEngine {
        &mut self.engine
    }

    pub fn upload_dir(&self) -> &Path {
        &self.config.upload_dir
    }

    /// Absolute path of a document given its `name` or `folder/name` path.
    pub fn document_path(&self, relative: &str) -> Result<PathBuf, AppError> {
        validate_document_path(relative)?;
        Ok(self.config.upload_dir.join(relative))
    }
}

/// A single, plain path component: no separators, no `.`/`..`.
pub fn validate_name(name: &str) -> Result<(), AppError> {
    let trimmed = name.trim();
    let mut components = Path::new(trimmed).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if trimmed == name && !name.contains(['/', '\\']) => {
            Ok(())
        }
        _ => Err(AppError::InvalidInput(format!("invalid name: {:?}", name))),
    }
}

/// `name` or `folder/name`, each a plain component.
pub fn validate_document_path(relative: &str) -> Result<(), AppError> {
    let parts: Vec<&str> = relative.split('/').collect();
    if parts.is_empty() || parts.len() > 2 {
        return Err(AppError::InvalidInput(format!(
            "invalid document path: {:?}",
            relative
        )));
    }
    parts.into_iter().try_for_each(validate_name)
}
