use serde::{Deserialize, Serialize};

/// One uploaded file as listed in the admin page.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub file_type: String,
    pub file_path: String,
    pub file_size: Option<i64>,
    pub chunk_count: usize,
    pub created_at: String,
}

impl Document {
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }
}

pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Document fields known before insertion.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub filename: String,
    pub file_type: String,
    pub file_path: String,
    pub file_size: Option<i64>,
    pub content: String,
}

/// Chunk text paired with its embedding, ready to insert.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub content: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub filename: String,
    pub content: String,
    pub chunk_index: i32,
}

#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}
