use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One question/answer exchange.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ConversationTurn {
    pub id: i64,
    pub model: String,
    pub question: String,
    pub answer: String,
    /// Comma-joined source file names
    pub sources: Option<String>,
    pub created_at: String,
}

impl ConversationTurn {
    pub fn source_list(&self) -> Vec<String> {
        self.sources
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct DocumentNote {
    pub note: String,
    pub favorite: bool,
}

/// A tracked access-to-information (LAI) request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LaiRequest {
    pub id: i64,
    pub question: String,
    pub submitted_on: NaiveDate,
    pub response_deadline: NaiveDate,
    pub origin: String,
    pub recipient: String,
    pub appeal_body_1: String,
    pub appeal_site_1: String,
    pub appeal_text_1: String,
    pub appeal_body_2: String,
    pub appeal_site_2: String,
    pub appeal_text_2: String,
    pub tag: Option<String>,
    pub active_transparency: bool,
    pub private_note: String,
}

/// Form input for a new LAI request. The deadline is always derived.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct NewLaiRequest {
    pub question: String,
    pub submitted_on: Option<NaiveDate>,
    pub origin: String,
    pub recipient: String,
    pub appeal_body_1: String,
    pub appeal_site_1: String,
    pub appeal_text_1: String,
    pub appeal_body_2: String,
    pub appeal_site_2: String,
    pub appeal_text_2: String,
    pub tag: Option<String>,
    pub active_transparency: bool,
    pub private_note: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct LaiFilter {
    pub tag: Option<String>,
    pub recipient: Option<String>,
}

/// One page of LAI requests.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LaiPage {
    pub requests: Vec<LaiRequest>,
    pub page: usize,
    pub total_pages: usize,
    pub total: usize,
}
