use serde::Serialize;
use tracing::warn;

use super::library::available_files;
use super::App;
use crate::cache::{CacheKind, SidecarCache};
use crate::doc_processor;
use crate::error::AppError;

const MAX_SNIPPETS: usize = 3;
const SUMMARY_CHARS: usize = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub file: String,
    /// Up to three matching lines, trimmed.
    pub snippets: Vec<String>,
    pub summary: String,
}

#[derive(Debug, Default, Serialize)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    /// Documents that could not be read, with the reason.
    pub failures: Vec<(String, String)>,
}

/// Whitespace-collapsed prefix of `text`, with an ellipsis when cut.
pub fn summarize(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= SUMMARY_CHARS {
        return collapsed;
    }
    let mut summary: String = collapsed.chars().take(SUMMARY_CHARS).collect();
    summary.push_str("...");
    summary
}

pub fn matching_lines(content: &str, term: &str) -> Vec<String> {
    let needle = term.to_lowercase();
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && line.to_lowercase().contains(&needle))
        .take(MAX_SNIPPETS)
        .map(String::from)
        .collect()
}

/// Case-insensitive search over every document's extracted text.
pub fn search_documents(app: &App, term: &str) -> Result<SearchResults, AppError> {
    let term = term.trim();
    if term.is_empty() {
        return Err(AppError::InvalidInput("search term is empty".into()));
    }

    let mut results = SearchResults::default();
    for file in available_files(app)? {
        let path = match app.document_path(&file) {
            Ok(path) => path,
            Err(e) => {
                warn!("search skipped {}: {}", file, e);
                results.failures.push((file, e.to_string()));
                continue;
            }
        };
        let content = match doc_processor::parse_file(&path) {
            Ok(parsed) => parsed.content(),
            Err(e) => {
                warn!("search skipped {}: {}", file, e);
                results.failures.push((file, e.to_string()));
                continue;
            }
        };

        let snippets = matching_lines(&content, term);
        if snippets.is_empty() {
            continue;
        }
        let summary = SidecarCache::new(CacheKind::Summary)
            .get_or_insert_with(&path, || Ok::<_, AppError>(summarize(&content)))?;
        results.hits.push(SearchHit {
            file,
            snippets,
            summary,
        });
    }
    Ok(results)
}
