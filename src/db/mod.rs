mod lai;
pub mod models;

use models::{ConversationTurn, DocumentNote};
use rusqlite::{params, Connection, OptionalExtension, Result};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub use lai::LAI_PAGE_SIZE;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(db_path: &Path) -> Result<Self> {
        Self::with_connection(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                model TEXT NOT NULL,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                sources TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS document_tags (
                file_name TEXT PRIMARY KEY,
                tags TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS document_notes (
                file_name TEXT PRIMARY KEY,
                note TEXT NOT NULL DEFAULT '',
                favorite INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS lai_requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                question TEXT NOT NULL,
                submitted_on TEXT NOT NULL,
                response_deadline TEXT NOT NULL,
                origin TEXT NOT NULL DEFAULT '',
                recipient TEXT NOT NULL DEFAULT '',
                appeal_body_1 TEXT NOT NULL DEFAULT '',
                appeal_site_1 TEXT NOT NULL DEFAULT '',
                appeal_text_1 TEXT NOT NULL DEFAULT '',
                appeal_body_2 TEXT NOT NULL DEFAULT '',
                appeal_site_2 TEXT NOT NULL DEFAULT '',
                appeal_text_2 TEXT NOT NULL DEFAULT '',
                tag TEXT,
                active_transparency INTEGER NOT NULL DEFAULT 0,
                private_note TEXT NOT NULL DEFAULT ''
            );
            ",
        )?;
        Ok(())
    }

    // ── Conversation history ──

    pub fn save_turn(
        &self,
        model: &str,
        question: &str,
        answer: &str,
        sources: Option<&str>,
    ) -> Result<ConversationTurn> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO history (model, question, answer, sources) VALUES (?1, ?2, ?3, ?4)",
            params![model, question, answer, sources],
        )?;
        let id = conn.last_insert_rowid();
        conn.query_row(
            "SELECT id, model, question, answer, sources, created_at FROM history WHERE id = ?1",
            params![id],
            turn_from_row,
        )
    }

    /// Every turn, oldest first.
    pub fn load_history(&self) -> Result<Vec<ConversationTurn>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, model, question, answer, sources, created_at FROM history ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], turn_from_row)?;
        rows.collect()
    }

    /// The last `n` turns, oldest first.
    pub fn recent_turns(&self, n: usize) -> Result<Vec<ConversationTurn>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, model, question, answer, sources, created_at FROM
                (SELECT * FROM history ORDER BY id DESC LIMIT ?1)
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![n as i64], turn_from_row)?;
        rows.collect()
    }

    /// Wipe the history and restart the id sequence.
    pub fn delete_all_history(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(
            "DELETE FROM history;
             DELETE FROM sqlite_sequence WHERE name = 'history';",
        )?;
        Ok(())
    }

    /// Number of turns per model, most used first.
    pub fn model_usage(&self) -> Result<Vec<(String, usize)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT model, COUNT(*) AS n FROM history GROUP BY model ORDER BY n DESC, model ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            let n: i64 = row.get(1)?;
            Ok((row.get(0)?, n as usize))
        })?;
        rows.collect()
    }

    // ── Tags ──

    /// Replace the tag set of `file`. An empty set removes the row.
    pub fn save_tags_for_file(&self, file: &str, tags: &[String]) -> Result<()> {
        let mut clean: Vec<&str> = Vec::new();
        for tag in tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            if !clean.contains(&tag) {
                clean.push(tag);
            }
        }

        let conn = self.conn();
        if clean.is_empty() {
            conn.execute("DELETE FROM document_tags WHERE file_name = ?1", params![file])?;
        } else {
            conn.execute(
                "INSERT OR REPLACE INTO document_tags (file_name, tags) VALUES (?1, ?2)",
                params![file, clean.join(",")],
            )?;
        }
        Ok(())
    }

    pub fn get_tags_for_file(&self, file: &str) -> Result<Vec<String>> {
        let conn = self.conn();
        let tags: Option<String> = conn
            .query_row(
                "SELECT tags FROM document_tags WHERE file_name = ?1",
                params![file],
                |row| row.get(0),
            )
            .optional()?;
        Ok(tags.as_deref().map(split_tags).unwrap_or_default())
    }

    fn all_tag_rows(&self) -> Result<Vec<(String, Vec<String>)>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT file_name, tags FROM document_tags ORDER BY file_name ASC")?;
        let rows = stmt.query_map([], |row| {
            let tags: String = row.get(1)?;
            Ok((row.get(0)?, split_tags(&tags)))
        })?;
        rows.collect()
    }

    /// Distinct tags across all documents, sorted.
    pub fn get_all_tags(&self) -> Result<Vec<String>> {
        let mut tags: Vec<String> = self
            .all_tag_rows()?
            .into_iter()
            .flat_map(|(_, tags)| tags)
            .collect();
        tags.sort();
        tags.dedup();
        Ok(tags)
    }

    /// Documents carrying exactly `tag`.
    pub fn files_with_tag(&self, tag: &str) -> Result<Vec<String>> {
        let tag = tag.trim();
        Ok(self
            .all_tag_rows()?
            .into_iter()
            .filter(|(_, tags)| tags.iter().any(|t| t == tag))
            .map(|(file, _)| file)
            .collect())
    }

    /// How many documents carry each tag, most used first.
    pub fn tag_counts(&self) -> Result<Vec<(String, usize)>> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for (_, tags) in self.all_tag_rows()? {
            for tag in tags {
                match counts.iter_mut().find(|(t, _)| *t == tag) {
                    Some((_, n)) => *n += 1,
                    None => counts.push((tag, 1)),
                }
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(counts)
    }

    // ── Notes / favorites ──

    pub fn save_document_note(&self, file: &str, note: &str, favorite: bool) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR REPLACE INTO document_notes (file_name, note, favorite) VALUES (?1, ?2, ?3)",
            params![file, note, favorite],
        )?;
        Ok(())
    }

    pub fn get_document_note(&self, file: &str) -> Result<DocumentNote> {
        let conn = self.conn();
        let note = conn
            .query_row(
                "SELECT note, favorite FROM document_notes WHERE file_name = ?1",
                params![file],
                |row| {
                    Ok(DocumentNote {
                        note: row.get(0)?,
                        favorite: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(note.unwrap_or_default())
    }

    // ── Document bookkeeping ──

    /// Drop tags and notes of deleted documents.
    pub fn forget_documents(&self, files: &[String]) -> Result<()> {
        let conn = self.conn();
        for file in files {
            conn.execute("DELETE FROM document_tags WHERE file_name = ?1", params![file])?;
            conn.execute("DELETE FROM document_notes WHERE file_name = ?1", params![file])?;
        }
        Ok(())
    }

    /// Re-key tags and notes after a move or folder rename. `old` and `new`
    /// are either document paths or folder prefixes ending in `/`.
    pub fn rename_document_refs(&self, old: &str, new: &str) -> Result<()> {
        let conn = self.conn();
        for table in ["document_tags", "document_notes"] {
            if old.ends_with('/') {
                conn.execute(
                    &format!(
                        "UPDATE OR REPLACE {table} SET file_name = ?2 || substr(file_name, length(?1) + 1)
                         WHERE substr(file_name, 1, length(?1)) = ?1"
                    ),
                    params![old, new],
                )?;
            } else {
                conn.execute(
                    &format!("UPDATE OR REPLACE {table} SET file_name = ?2 WHERE file_name = ?1"),
                    params![old, new],
                )?;
            }
        }
        Ok(())
    }
}

fn turn_from_row(row: &rusqlite::Row<'_>) -> Result<ConversationTurn> {
    Ok(ConversationTurn {
        id: row.get(0)?,
        model: row.get(1)?,
        question: row.get(2)?,
        answer: row.get(3)?,
        sources: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn split_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}
