use serde::Serialize;

use crate::llm::LlmError;

/// Failure to turn a file into text.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{format} parse error: {message}")]
    Parse { format: &'static str, message: String },
    #[error("no extractable text in {0}")]
    NoText(String),
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("no content to vectorize")]
    NoContent,
    #[error("Embedding error: {0}")]
    Embedding(#[from] LlmError),
    #[error("embedding count mismatch: {expected} chunks, {actual} vectors")]
    EmbeddingCount { expected: usize, actual: usize },
    #[error("Index storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("No valid content was vectorized for the selected files")]
    NoContent,
    #[error("Index error: {0}")]
    Index(IndexError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<IndexError> for AppError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::NoContent => AppError::NoContent,
            IndexError::Embedding(e) => AppError::Llm(e),
            other => AppError::Index(other),
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
