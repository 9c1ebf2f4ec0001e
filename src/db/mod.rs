pub mod models;

use crate::embedding::{bytes_to_embedding, embedding_to_bytes, search_similar};
use crate::error::AppResult;
use models::{Chunk, Document, NewChunk, NewDocument, ScoredChunk};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

const DOCUMENT_COLUMNS: &str = "d.id, d.filename, d.file_type, d.file_path, d.file_size, d.created_at, \
     (SELECT COUNT(*) FROM chunks c WHERE c.document_id = d.id)";

/// SQLite-backed document and chunk store. Chunk embeddings live next to
/// their text as little-endian f32 blobs.
pub struct Database {
    pub conn: Mutex<Connection>,
}

impl Database {
    pub fn new(db_path: &Path) -> AppResult<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> AppResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> AppResult<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> AppResult<()> {
        let conn = self.conn.lock()?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA foreign_keys=ON;

            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                file_type TEXT NOT NULL,
                file_path TEXT NOT NULL,
                file_size INTEGER,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                content TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                embedding BLOB,
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);
            ",
        )?;
        Ok(())
    }

    // ── Documents ──

    /// Inserts the document and all of its chunks atomically.
    pub fn insert_document(&self, doc: &NewDocument, chunks: &[NewChunk]) -> AppResult<String> {
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction()?;
        let doc_id = uuid::Uuid::new_v4().to_string();

        tx.execute(
            "INSERT INTO documents (id, filename, file_type, file_path, file_size, content) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                doc_id,
                doc.filename,
                doc.file_type,
                doc.file_path,
                doc.file_size,
                doc.content
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks (id, document_id, content, chunk_index, embedding) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (i, chunk) in chunks.iter().enumerate() {
                stmt.execute(params![
                    uuid::Uuid::new_v4().to_string(),
                    doc_id,
                    chunk.content,
                    i as i32,
                    embedding_to_bytes(&chunk.embedding),
                ])?;
            }
        }

        tx.commit()?;
        Ok(doc_id)
    }

    pub fn list_documents(&self) -> AppResult<Vec<Document>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents d ORDER BY d.created_at DESC, d.rowid DESC"
        ))?;
        let rows = stmt.query_map([], document_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_document(&self, id: &str) -> AppResult<Option<Document>> {
        let conn = self.conn.lock()?;
        let doc = conn
            .query_row(
                &format!("SELECT {DOCUMENT_COLUMNS} FROM documents d WHERE d.id = ?1"),
                params![id],
                document_from_row,
            )
            .optional()?;
        Ok(doc)
    }

    pub fn document_ids_by_filename(&self, filename: &str) -> AppResult<Vec<String>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare("SELECT id FROM documents WHERE filename = ?1")?;
        let rows = stmt.query_map(params![filename], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<String>, _>>()?)
    }

    pub fn document_content(&self, id: &str) -> AppResult<Option<String>> {
        let conn = self.conn.lock()?;
        let content = conn
            .query_row(
                "SELECT content FROM documents WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(content)
    }

    pub fn count_documents(&self) -> AppResult<usize> {
        let conn = self.conn.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Removes the document and, through the cascade, its chunks. Returns the
    /// removed record so callers can clean up the stored file.
    pub fn delete_document(&self, id: &str) -> AppResult<Option<Document>> {
        let existing = self.get_document(id)?;
        if existing.is_some() {
            let conn = self.conn.lock()?;
            conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        }
        Ok(existing)
    }

    // ── Retrieval ──

    /// Top-k chunks by cosine similarity to `query_embedding`.
    pub fn search_chunks(&self, query_embedding: &[f32], top_k: usize) -> AppResult<Vec<ScoredChunk>> {
        let mut chunks: HashMap<String, Chunk> = HashMap::new();
        let mut embeddings: Vec<(String, Vec<f32>)> = Vec::new();
        {
            let conn = self.conn.lock()?;
            let mut stmt = conn.prepare(
                "SELECT c.id, c.document_id, d.filename, c.content, c.chunk_index, c.embedding
                 FROM chunks c JOIN documents d ON d.id = c.document_id
                 WHERE c.embedding IS NOT NULL",
            )?;
            let rows = stmt.query_map([], |row| {
                let bytes: Vec<u8> = row.get(5)?;
                Ok((
                    Chunk {
                        id: row.get(0)?,
                        document_id: row.get(1)?,
                        filename: row.get(2)?,
                        content: row.get(3)?,
                        chunk_index: row.get(4)?,
                    },
                    bytes_to_embedding(&bytes),
                ))
            })?;
            for row in rows {
                let (chunk, embedding) = row?;
                embeddings.push((chunk.id.clone(), embedding));
                chunks.insert(chunk.id.clone(), chunk);
            }
        }

        Ok(search_similar(query_embedding, &embeddings, top_k)
            .into_iter()
            .filter_map(|(id, score)| chunks.remove(&id).map(|chunk| ScoredChunk { chunk, score }))
            .collect())
    }
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    let chunk_count: i64 = row.get(6)?;
    Ok(Document {
        id: row.get(0)?,
        filename: row.get(1)?,
        file_type: row.get(2)?,
        file_path: row.get(3)?,
        file_size: row.get(4)?,
        created_at: row.get(5)?,
        chunk_count: chunk_count as usize,
    })
}
