use serde::Serialize;
use tracing::info;

use super::App;
use crate::db::models::{LaiFilter, LaiPage, LaiRequest, NewLaiRequest};
use crate::error::AppError;

/// A request with everything shown on its detail card.
#[derive(Debug, Clone, Serialize)]
pub struct LaiDetail {
    pub request: LaiRequest,
    /// Other requests with the same tag, newest first.
    pub related_requests: Vec<(i64, String)>,
    /// Library documents carrying the same tag.
    pub related_documents: Vec<String>,
}

pub fn register(app: &App, input: &NewLaiRequest) -> Result<LaiRequest, AppError> {
    if input.question.trim().is_empty() {
        return Err(AppError::InvalidInput("the request question is required".into()));
    }
    let saved = app.db.insert_lai_request(input)?;
    info!(
        "LAI request #{} registered, answer due {}",
        saved.id, saved.response_deadline
    );
    Ok(saved)
}

pub fn list(app: &App, filter: &LaiFilter, page: usize) -> Result<LaiPage, AppError> {
    Ok(app.db.list_lai_requests(filter, page)?)
}

pub fn detail(app: &App, id: i64) -> Result<LaiDetail, AppError> {
    let request = app
        .db
        .get_lai_request(id)?
        .ok_or_else(|| AppError::NotFound(format!("LAI request #{}", id)))?;
    let (related_requests, related_documents) = match request.tag.as_deref() {
        Some(tag) => (
            app.db.related_lai_requests(tag, id)?,
            app.db.files_with_tag(tag)?,
        ),
        None => (Vec::new(), Vec::new()),
    };
    Ok(LaiDetail {
        request,
        related_requests,
        related_documents,
    })
}

pub fn edit(
    app: &App,
    id: i64,
    question: &str,
    tag: Option<&str>,
    private_note: &str,
) -> Result<LaiRequest, AppError> {
    if !app.db.update_lai_request(id, question, tag, private_note)? {
        return Err(AppError::NotFound(format!("LAI request #{}", id)));
    }
    app.db
        .get_lai_request(id)?
        .ok_or_else(|| AppError::NotFound(format!("LAI request #{}", id)))
}
