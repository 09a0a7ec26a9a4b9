//! Document question answering: ingest files, vectorize them, and answer
//! questions with an LLM over the retrieved extracts. Also tracks document
//! tags, notes and folders, and access-to-information (LAI) requests.

pub mod cache;
pub mod commands;
pub mod config;
pub mod db;
pub mod doc_processor;
pub mod embedding;
pub mod error;
pub mod index;
pub mod lai;
pub mod llm;
pub mod logging;
pub mod rag;
pub mod view;

pub use commands::App;
pub use config::AppConfig;
pub use error::AppError;
