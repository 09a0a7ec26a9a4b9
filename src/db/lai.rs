use chrono::Local;
use rusqlite::{params, params_from_iter, types::Value, OptionalExtension, Result};

use super::models::{LaiFilter, LaiPage, LaiRequest, NewLaiRequest};
use super::Database;
use crate::lai::response_deadline;

pub const LAI_PAGE_SIZE: usize = 20;
const RELATED_LIMIT: i64 = 5;

const LAI_COLUMNS: &str = "id, question, submitted_on, response_deadline, origin, recipient,
    appeal_body_1, appeal_site_1, appeal_text_1, appeal_body_2, appeal_site_2, appeal_text_2,
    tag, active_transparency, private_note";

fn lai_from_row(row: &rusqlite::Row<'_>) -> Result<LaiRequest> {
    Ok(LaiRequest {
        id: row.get(0)?,
        question: row.get(1)?,
        submitted_on: row.get(2)?,
        response_deadline: row.get(3)?,
        origin: row.get(4)?,
        recipient: row.get(5)?,
        appeal_body_1: row.get(6)?,
        appeal_site_1: row.get(7)?,
        appeal_text_1: row.get(8)?,
        appeal_body_2: row.get(9)?,
        appeal_site_2: row.get(10)?,
        appeal_text_2: row.get(11)?,
        tag: row.get(12)?,
        active_transparency: row.get(13)?,
        private_note: row.get(14)?,
    })
}

fn normalize_tag(tag: Option<&str>) -> Option<String> {
    tag.map(str::trim).filter(|t| !t.is_empty()).map(String::from)
}

/// `WHERE` clause and parameters for a filter.
fn filter_clause(filter: &LaiFilter) -> (String, Vec<Value>) {
    let mut clause = String::from("WHERE 1=1");
    let mut values = Vec::new();
    if let Some(tag) = normalize_tag(filter.tag.as_deref()) {
        clause.push_str(" AND tag = ?");
        values.push(Value::Text(tag));
    }
    if let Some(recipient) = filter.recipient.as_deref().filter(|r| !r.trim().is_empty()) {
        clause.push_str(" AND recipient = ?");
        values.push(Value::Text(recipient.trim().to_string()));
    }
    (clause, values)
}

impl Database {
    // ── LAI requests ──

    /// Store a new request. The submission date defaults to today and the
    /// deadline is derived from it.
    pub fn insert_lai_request(&self, input: &NewLaiRequest) -> Result<LaiRequest> {
        let submitted_on = input
            .submitted_on
            .unwrap_or_else(|| Local::now().date_naive());
        let deadline = response_deadline(submitted_on);

        let id = {
            let conn = self.conn();
            conn.execute(
                "INSERT INTO lai_requests (
                    question, submitted_on, response_deadline, origin, recipient,
                    appeal_body_1, appeal_site_1, appeal_text_1,
                    appeal_body_2, appeal_site_2, appeal_text_2,
                    tag, active_transparency, private_note
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    input.question,
                    submitted_on,
                    deadline,
                    input.origin,
                    input.recipient,
                    input.appeal_body_1,
                    input.appeal_site_1,
                    input.appeal_text_1,
                    input.appeal_body_2,
                    input.appeal_site_2,
                    input.appeal_text_2,
                    normalize_tag(input.tag.as_deref()),
                    input.active_transparency,
                    input.private_note,
                ],
            )?;
            conn.last_insert_rowid()
        };

        self.get_lai_request(id)?
            .ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    pub fn get_lai_request(&self, id: i64) -> Result<Option<LaiRequest>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {LAI_COLUMNS} FROM lai_requests WHERE id = ?1"),
            params![id],
            lai_from_row,
        )
        .optional()
    }

    pub fn count_lai_requests(&self, filter: &LaiFilter) -> Result<usize> {
        let (clause, values) = filter_clause(filter);
        let conn = self.conn();
        let n: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM lai_requests {clause}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// One page (1-based, clamped to the valid range) of requests, newest
    /// submission first.
    pub fn list_lai_requests(&self, filter: &LaiFilter, page: usize) -> Result<LaiPage> {
        let total = self.count_lai_requests(filter)?;
        let total_pages = total.div_ceil(LAI_PAGE_SIZE).max(1);
        let page = page.clamp(1, total_pages);
        let offset = (page - 1) * LAI_PAGE_SIZE;

        let (clause, mut values) = filter_clause(filter);
        values.push(Value::Integer(LAI_PAGE_SIZE as i64));
        values.push(Value::Integer(offset as i64));

        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {LAI_COLUMNS} FROM lai_requests {clause}
             ORDER BY submitted_on DESC, id DESC LIMIT ? OFFSET ?"
        ))?;
        let requests = stmt
            .query_map(params_from_iter(values.iter()), lai_from_row)?
            .collect::<Result<Vec<_>>>()?;

        Ok(LaiPage {
            requests,
            page,
            total_pages,
            total,
        })
    }

    /// Edit the mutable fields of a request. Returns false if `id` is unknown.
    pub fn update_lai_request(
        &self,
        id: i64,
        question: &str,
        tag: Option<&str>,
        private_note: &str,
    ) -> Result<bool> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE lai_requests SET question = ?1, tag = ?2, private_note = ?3 WHERE id = ?4",
            params![question, normalize_tag(tag), private_note, id],
        )?;
        Ok(changed > 0)
    }

    /// Up to five other requests sharing `tag`, newest first.
    pub fn related_lai_requests(&self, tag: &str, exclude_id: i64) -> Result<Vec<(i64, String)>> {
        let Some(tag) = normalize_tag(Some(tag)) else {
            return Ok(vec![]);
        };
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, question FROM lai_requests
             WHERE tag = ?1 AND id != ?2
             ORDER BY submitted_on DESC, id DESC LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![tag, exclude_id, RELATED_LIMIT], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;
        rows.collect()
    }

    pub fn lai_tags(&self) -> Result<Vec<String>> {
        self.distinct_lai_column("tag")
    }

    pub fn lai_recipients(&self) -> Result<Vec<String>> {
        self.distinct_lai_column("recipient")
    }

    fn distinct_lai_column(&self, column: &str) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT {column} FROM lai_requests
             WHERE {column} IS NOT NULL AND {column} != '' ORDER BY {column} ASC"
        ))?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn request(question: &str, date: (i32, u32, u32), tag: Option<&str>, recipient: &str) -> NewLaiRequest {
        NewLaiRequest {
            question: question.into(),
            submitted_on: NaiveDate::from_ymd_opt(date.0, date.1, date.2),
            recipient: recipient.into(),
            tag: tag.map(String::from),
            ..NewLaiRequest::default()
        }
    }

    #[test]
    fn test_insert_derives_deadline() {
        let db = Database::open_in_memory().unwrap();
        let saved = db
            .insert_lai_request(&request("Quanto custou a obra?", (2024, 3, 1), Some(" obras "), "SEINFRA"))
            .unwrap();
        assert_eq!(saved.response_deadline, NaiveDate::from_ymd_opt(2024, 3, 29).unwrap());
        assert_eq!(saved.tag.as_deref(), Some("obras"));
        assert_eq!(db.get_lai_request(saved.id).unwrap(), Some(saved));
        assert_eq!(db.get_lai_request(999).unwrap(), None);
    }

    #[test]
    fn test_list_filters_and_paginates() {
        let db = Database::open_in_memory().unwrap();
        for day in 1..=25 {
            let tag = if day % 2 == 0 { Some("saude") } else { None };
            db.insert_lai_request(&request(&format!("q{day}"), (2024, 1, day), tag, "SES"))
                .unwrap();
        }
        db.insert_lai_request(&request("other", (2024, 2, 1), Some("saude"), "SME"))
            .unwrap();

        let all = db.list_lai_requests(&LaiFilter::default(), 1).unwrap();
        assert_eq!(all.total, 26);
        assert_eq!(all.total_pages, 2);
        assert_eq!(all.requests.len(), LAI_PAGE_SIZE);
        assert_eq!(all.requests[0].question, "other");

        let last = db.list_lai_requests(&LaiFilter::default(), 9).unwrap();
        assert_eq!(last.page, 2);
        assert_eq!(last.requests.len(), 6);

        let filter = LaiFilter {
            tag: Some("saude".into()),
            recipient: Some("SES".into()),
        };
        let filtered = db.list_lai_requests(&filter, 1).unwrap();
        assert_eq!(filtered.total, 12);
        assert!(filtered.requests.iter().all(|r| r.recipient == "SES"));

        assert_eq!(db.lai_recipients().unwrap(), vec!["SES", "SME"]);
        assert_eq!(db.lai_tags().unwrap(), vec!["saude"]);
    }

    #[test]
    fn test_empty_list_has_one_page() {
        let db = Database::open_in_memory().unwrap();
        let page = db.list_lai_requests(&LaiFilter::default(), 3).unwrap();
        assert_eq!((page.page, page.total_pages, page.total), (1, 1, 0));
        assert!(page.requests.is_empty());
    }

    #[test]
    fn test_update_and_related() {
        let db = Database::open_in_memory().unwrap();
        let a = db.insert_lai_request(&request("a", (2024, 5, 2), Some("x"), "U")).unwrap();
        let b = db.insert_lai_request(&request("b", (2024, 5, 3), Some("x"), "U")).unwrap();
        let c = db.insert_lai_request(&request("c", (2024, 5, 4), Some("y"), "U")).unwrap();

        let related = db.related_lai_requests("x", a.id).unwrap();
        assert_eq!(related, vec![(b.id, "b".to_string())]);
        assert!(db.related_lai_requests("", a.id).unwrap().is_empty());

        assert!(db.update_lai_request(c.id, "c edited", Some("x"), "private").unwrap());
        let c = db.get_lai_request(c.id).unwrap().unwrap();
        assert_eq!(c.question, "c edited");
        assert_eq!(c.private_note, "private");
        assert_eq!(db.related_lai_requests("x", a.id).unwrap().len(), 2);

        assert!(!db.update_lai_request(404, "q", None, "").unwrap());
    }
}
