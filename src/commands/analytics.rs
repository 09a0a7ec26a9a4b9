use serde::Serialize;

use super::library::available_files;
use super::App;
use crate::error::AppError;

#[derive(Debug, Clone, Serialize)]
pub struct Analytics {
    pub total_documents: usize,
    pub tag_counts: Vec<(String, usize)>,
    pub model_usage: Vec<(String, usize)>,
}

pub fn collect(app: &App) -> Result<Analytics, AppError> {
    Ok(Analytics {
        total_documents: available_files(app)?.len(),
        tag_counts: app.db.tag_counts()?,
        model_usage: app.db.model_usage()?,
    })
}
