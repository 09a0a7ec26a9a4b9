use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::AppError;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CLAUDE_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

/// Credentials for an OpenAI-compatible endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub api_key: Option<String>,
    pub base_url: String,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaudeSettings {
    pub api_key: Option<String>,
    pub base_url: String,
}

impl Default for ClaudeSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_CLAUDE_BASE_URL.to_string(),
        }
    }
}

/// Application configuration.
///
/// Built once at startup and handed to every component; nothing below
/// `main` reads the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root directory holding uploaded documents (one folder level deep).
    pub upload_dir: PathBuf,
    /// Directory holding the persistent vector index.
    pub index_dir: PathBuf,
    /// SQLite file for history, tags, notes and LAI records.
    pub db_path: PathBuf,
    /// Window length in characters
    pub chunk_size: usize,
    /// Characters shared by consecutive windows
    pub chunk_overlap: usize,
    /// Number of chunks retrieved per question
    pub top_k: usize,
    pub embedding_model: String,
    pub default_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Prior turns replayed to the model when history is not ignored.
    pub history_window: usize,
    pub openai: OpenAiSettings,
    pub claude: ClaudeSettings,
    pub ollama_host: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploaded_files"),
            index_dir: PathBuf::from("chroma"),
            db_path: PathBuf::from("chat_history.sqlite3"),
            chunk_size: 1000,
            chunk_overlap: 400,
            top_k: 4,
            embedding_model: "text-embedding-3-small".to_string(),
            default_model: "gpt-4o".to_string(),
            temperature: 0.8,
            max_tokens: 1500,
            history_window: 3,
            openai: OpenAiSettings::default(),
            claude: ClaudeSettings::default(),
            ollama_host: DEFAULT_OLLAMA_HOST.to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file, then fill missing API
    /// keys from `OPENAI_API_KEY` / `ANTHROPIC_API_KEY`.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if config.openai.api_key.is_none() {
            config.openai.api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
        }
        if config.claude.api_key.is_none() {
            config.claude.api_key =
                std::env::var("ANTHROPIC_API_KEY").ok().filter(|k| !k.is_empty());
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, AppError> {
        toml::from_str(raw).map_err(|e| AppError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.chunk_size == 0 {
            return Err(AppError::Config("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(AppError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(AppError::Config("top_k must be positive".into()));
        }
        Ok(())
    }

    /// Create the upload and index directories if missing.
    pub fn ensure_dirs(&self) -> Result<(), AppError> {
        std::fs::create_dir_all(&self.upload_dir)?;
        std::fs::create_dir_all(&self.index_dir)?;
        if let Some(parent) = self.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    pub fn index_path(&self) -> PathBuf {
        self.index_dir.join("vectors.sqlite3")
    }

    /// Config rooted in `dir`, for tests and throwaway sessions.
    pub fn rooted_at(dir: &Path) -> Self {
        Self {
            upload_dir: dir.join("uploaded_files"),
            index_dir: dir.join("chroma"),
            db_path: dir.join("chat_history.sqlite3"),
            ..Self::default()
        }
    }
}
