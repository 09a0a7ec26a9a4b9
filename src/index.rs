//! Persistent vector index and the client that feeds it.
//!
//! Rows are `(source, page, chunk_index, content, embedding)`; search is a
//! brute-force cosine scan over the rows in scope. Inserts are additive:
//! indexing the same file twice stores its chunks twice.

use rusqlite::{params, params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::doc_processor::{self, Chunk};
use crate::embedding::{bytes_to_embedding, embedding_to_bytes, search_similar, EmbeddingProvider};
use crate::error::IndexError;

/// A chunk returned by a similarity query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub id: i64,
    pub chunk: Chunk,
    pub score: f32,
}

pub struct VectorIndex {
    conn: Mutex<Connection>,
}

impl VectorIndex {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> rusqlite::Result<Self> {
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS embeddings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source TEXT NOT NULL,
                page INTEGER NOT NULL,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_embeddings_source ON embeddings(source);
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert_batch(&self, items: &[(Chunk, Vec<f32>)]) -> rusqlite::Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO embeddings (source, page, chunk_index, content, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (chunk, embedding) in items {
                stmt.execute(params![
                    chunk.source,
                    chunk.page as i64,
                    chunk.chunk_index as i64,
                    chunk.content,
                    embedding_to_bytes(embedding),
                ])?;
            }
        }
        tx.commit()?;
        Ok(items.len())
    }

    /// Top-`k` rows by cosine similarity. `scope` limits the search to the
    /// given sources; `None` searches everything.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        scope: Option<&[String]>,
    ) -> rusqlite::Result<Vec<RetrievedChunk>> {
        let conn = self.conn();
        let mut sql =
            "SELECT id, source, page, chunk_index, content, embedding FROM embeddings".to_string();
        let scope = scope.unwrap_or_default();
        if !scope.is_empty() {
            let placeholders = vec!["?"; scope.len()].join(", ");
            sql.push_str(&format!(" WHERE source IN ({})", placeholders));
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(scope.iter()), |row| {
                let bytes: Vec<u8> = row.get(5)?;
                let page: i64 = row.get(2)?;
                let chunk_index: i64 = row.get(3)?;
                Ok((
                    (
                        row.get::<_, i64>(0)?,
                        Chunk {
                            source: row.get(1)?,
                            page: page as usize,
                            chunk_index: chunk_index as usize,
                            content: row.get(4)?,
                        },
                    ),
                    bytes_to_embedding(&bytes),
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(search_similar(query, &rows, k)
            .into_iter()
            .map(|((id, chunk), score)| RetrievedChunk { id, chunk, score })
            .collect())
    }

    pub fn count(&self) -> rusqlite::Result<usize> {
        let conn = self.conn();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Indexed sources with their row counts.
    pub fn sources(&self) -> rusqlite::Result<Vec<(String, usize)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT source, COUNT(*) FROM embeddings GROUP BY source ORDER BY source ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            let n: i64 = row.get(1)?;
            Ok((row.get(0)?, n as usize))
        })?;
        rows.collect()
    }

    /// Drop every row of the given sources. Returns the number removed.
    pub fn remove_sources(&self, sources: &[String]) -> rusqlite::Result<usize> {
        let conn = self.conn();
        let mut removed = 0;
        for source in sources {
            removed += conn.execute("DELETE FROM embeddings WHERE source = ?1", [source])?;
        }
        Ok(removed)
    }

    pub fn clear(&self) -> rusqlite::Result<()> {
        self.conn().execute("DELETE FROM embeddings", [])?;
        Ok(())
    }
}

/// How one file fared during ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FileOutcome {
    Chunked(usize),
    Empty,
    Failed(String),
}

/// Load and chunk each file under `upload_dir`. Failures are logged and
/// reported per file; they never abort the batch.
pub fn collect_chunks(
    upload_dir: &Path,
    files: &[String],
    chunk_size: usize,
    overlap: usize,
) -> (Vec<Chunk>, Vec<(String, FileOutcome)>) {
    let mut all_chunks = Vec::new();
    let mut report = Vec::with_capacity(files.len());

    for filename in files {
        let path = upload_dir.join(filename);
        let outcome = match doc_processor::parse_file(&path) {
            Ok(parsed) if !parsed.is_empty() => {
                let chunks =
                    doc_processor::chunk_segments(filename, &parsed.segments, chunk_size, overlap);
                info!("{} → {} chunk(s) vectorized", filename, chunks.len());
                let n = chunks.len();
                all_chunks.extend(chunks);
                if n == 0 {
                    FileOutcome::Empty
                } else {
                    FileOutcome::Chunked(n)
                }
            }
            Ok(_) => {
                warn!("{} → no text extracted (OCR may be required)", filename);
                FileOutcome::Empty
            }
            Err(e) => {
                warn!("{} → failed to load content: {}", filename, e);
                FileOutcome::Failed(e.to_string())
            }
        };
        report.push((filename.clone(), outcome));
    }

    (all_chunks, report)
}

/// Embeds chunks into a [`VectorIndex`] and answers similarity queries.
pub struct IndexClient {
    store: VectorIndex,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl IndexClient {
    pub fn new(store: VectorIndex, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedder }
    }

    pub fn store(&self) -> &VectorIndex {
        &self.store
    }

    /// Embed and store `chunks`. An empty batch is [`IndexError::NoContent`].
    pub async fn index(&self, chunks: &[Chunk]) -> Result<usize, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::NoContent);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(IndexError::EmbeddingCount {
                expected: chunks.len(),
                actual: embeddings.len(),
            });
        }

        let items: Vec<(Chunk, Vec<f32>)> = chunks.iter().cloned().zip(embeddings).collect();
        Ok(self.store.insert_batch(&items)?)
    }

    /// Load, chunk and index `files` (paths relative to `upload_dir`).
    /// Files that fail or yield nothing are reported, not fatal; a batch
    /// with no content at all indexes nothing.
    pub async fn build_index(
        &self,
        upload_dir: &Path,
        files: &[String],
        chunk_size: usize,
        overlap: usize,
    ) -> Result<Vec<(String, FileOutcome)>, IndexError> {
        let (chunks, report) = collect_chunks(upload_dir, files, chunk_size, overlap);
        match self.index(&chunks).await {
            Ok(n) => info!("indexed {} chunk(s) from {} file(s)", n, files.len()),
            Err(IndexError::NoContent) => debug!("no new content among {:?}", files),
            Err(e) => return Err(e),
        }
        Ok(report)
    }

    pub async fn query(
        &self,
        text: &str,
        k: usize,
        scope: Option<&[String]>,
    ) -> Result<Vec<RetrievedChunk>, IndexError> {
        let embeddings = self.embedder.embed(&[text.to_string()]).await?;
        let query = embeddings.first().ok_or(IndexError::EmbeddingCount {
            expected: 1,
            actual: 0,
        })?;
        Ok(self.store.search(query, k, scope)?)
    }
}
