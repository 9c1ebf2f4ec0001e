use crate::config::{AppPaths, RagSettings};
use crate::db::models::{short_id, Document, NewChunk, NewDocument};
use crate::db::Database;
use crate::doc_processor::{self, DocError};
use crate::embedding::Embedder;
use crate::error::{AppError, AppResult};
use crate::listing::DocumentPage;
use crate::state::AppState;
use serde::Serialize;
use std::path::{Path, PathBuf};

const EMBEDDING_BATCH_SIZE: usize = 20;
pub const PREVIEW_CHARS: usize = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct IngestedDocument {
    pub id: String,
    pub chunks: usize,
    /// Earlier records with the same filename that this upload replaced.
    pub replaced: usize,
    /// Whether a stored file of the same name was overwritten.
    pub replaced_file: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentPreview {
    pub document: Document,
    pub preview: String,
}

/// Per-file result of an upload batch.
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub filename: String,
    pub overwritten: bool,
    pub document_id: Option<String>,
    pub chunks: usize,
    pub error: Option<String>,
}

impl UploadOutcome {
    fn failed(filename: String, err: &AppError) -> Self {
        tracing::error!(file = %filename, error = %err, "upload failed");
        Self {
            filename,
            overwritten: false,
            document_id: None,
            chunks: 0,
            error: Some(err.to_string()),
        }
    }

    pub fn short_id(&self) -> &str {
        self.document_id.as_deref().map(short_id).unwrap_or("")
    }
}

/// Keep only the final path component so an upload can never escape the
/// upload directory.
pub fn sanitize_filename(name: &str) -> AppResult<String> {
    let candidate = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim()
        .to_string();
    if candidate.is_empty() || candidate == "." || candidate == ".." {
        return Err(AppError::InvalidFileName(name.to_string()));
    }
    Ok(candidate)
}

/// An upload written next to its final location under a hidden name. It
/// only takes the real name on [`StagedUpload::commit`]; dropping it
/// uncommitted removes the staged bytes.
pub struct StagedUpload {
    staged: PathBuf,
    target: PathBuf,
    replaces_file: bool,
    committed: bool,
}

impl StagedUpload {
    /// Where the bytes sit until commit.
    pub fn path(&self) -> &Path {
        &self.staged
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Whether committing overwrites a file already stored under this name.
    pub fn replaces_file(&self) -> bool {
        self.replaces_file
    }

    pub fn commit(mut self) -> AppResult<PathBuf> {
        std::fs::rename(&self.staged, &self.target)?;
        self.committed = true;
        if self.replaces_file {
            tracing::warn!(path = %self.target.display(), "existing file overwritten");
        }
        Ok(self.target.clone())
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.staged) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.staged.display(), error = %e, "failed to remove staged upload");
            }
        }
    }
}

/// Writes the bytes beside `upload_dir/<filename>` without touching any file
/// already stored there.
pub fn stage_upload(paths: &AppPaths, filename: &str, bytes: &[u8]) -> AppResult<StagedUpload> {
    std::fs::create_dir_all(&paths.upload_dir)?;
    let target = paths.upload_path(filename);
    let staged = paths
        .upload_dir
        .join(format!(".{}-{filename}", uuid::Uuid::new_v4()));
    let upload = StagedUpload {
        replaces_file: target.exists(),
        staged,
        target,
        committed: false,
    };
    std::fs::write(upload.path(), bytes)?;
    Ok(upload)
}

/// Parse → chunk → embed → store. The staged file is moved into place once
/// the new record is committed, and a previous record under the same filename
/// is removed after that. Any failure leaves the store and the upload
/// directory as they were.
pub async fn ingest_file(
    db: &Database,
    embedder: &dyn Embedder,
    settings: &RagSettings,
    upload: StagedUpload,
    filename: &str,
) -> AppResult<IngestedDocument> {
    let parse_path = upload.path().to_path_buf();
    let parsed = tokio::task::spawn_blocking(move || doc_processor::parse_file(&parse_path))
        .await
        .map_err(|e| AppError::Internal(format!("parser task failed: {e}")))??;

    let pieces = doc_processor::chunk_text(&parsed.content, settings.chunk_size, settings.chunk_overlap);
    if pieces.is_empty() {
        return Err(AppError::EmptyDocument(filename.to_string()));
    }

    let mut chunks = Vec::with_capacity(pieces.len());
    for batch in pieces.chunks(EMBEDDING_BATCH_SIZE) {
        let embeddings = embedder.embed(batch).await?;
        chunks.extend(
            batch
                .iter()
                .zip(embeddings)
                .map(|(content, embedding)| NewChunk {
                    content: content.clone(),
                    embedding,
                }),
        );
    }

    let previous = db.document_ids_by_filename(filename)?;
    let file_size = std::fs::metadata(upload.path()).map(|m| m.len() as i64).ok();
    let id = db.insert_document(
        &NewDocument {
            filename: filename.to_string(),
            file_type: parsed.file_type,
            file_path: upload.target().to_string_lossy().to_string(),
            file_size,
            content: parsed.content,
        },
        &chunks,
    )?;

    let replaced_file = upload.replaces_file();
    if let Err(e) = upload.commit() {
        db.delete_document(&id)?;
        return Err(e);
    }
    for old in &previous {
        db.delete_document(old)?;
    }

    tracing::info!(file = filename, id = %id, chunks = chunks.len(), "document indexed");
    Ok(IngestedDocument {
        id,
        chunks: chunks.len(),
        replaced: previous.len(),
        replaced_file,
    })
}

async fn upload_with(
    state: &AppState,
    embedder: &dyn Embedder,
    settings: &RagSettings,
    name: &str,
    bytes: &[u8],
) -> AppResult<UploadOutcome> {
    let filename = sanitize_filename(name)?;
    let ext = doc_processor::file_extension(Path::new(&filename));
    if !doc_processor::ACCEPTED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(DocError::Unsupported(ext).into());
    }
    if ext == "doc" {
        return Err(DocError::LegacyDoc.into());
    }

    let upload = stage_upload(&state.paths, &filename, bytes)?;
    let ingested = ingest_file(&state.db, embedder, settings, upload, &filename).await?;

    Ok(UploadOutcome {
        filename,
        overwritten: ingested.replaced_file,
        document_id: Some(ingested.id),
        chunks: ingested.chunks,
        error: None,
    })
}

/// Store one uploaded file and index it with the configured embedder.
pub async fn upload_document(state: &AppState, name: &str, bytes: &[u8]) -> AppResult<UploadOutcome> {
    let config = state.config()?;
    let embedder = state.embedder(&config)?;
    upload_with(state, embedder.as_ref(), &config.rag_settings, name, bytes).await
}

async fn upload_batch(
    state: &AppState,
    embedder: &dyn Embedder,
    settings: &RagSettings,
    files: Vec<(String, Vec<u8>)>,
) -> Vec<UploadOutcome> {
    let mut outcomes = Vec::with_capacity(files.len());
    for (name, bytes) in files {
        let outcome = match upload_with(state, embedder, settings, &name, &bytes).await {
            Ok(outcome) => outcome,
            Err(e) => UploadOutcome::failed(name, &e),
        };
        outcomes.push(outcome);
    }
    outcomes
}

/// Uploads a batch; one failing file does not stop the rest.
pub async fn upload_documents(state: &AppState, files: Vec<(String, Vec<u8>)>) -> Vec<UploadOutcome> {
    let resolved = state
        .config()
        .and_then(|config| Ok((state.embedder(&config)?, config)));
    match resolved {
        Ok((embedder, config)) => {
            upload_batch(state, embedder.as_ref(), &config.rag_settings, files).await
        }
        Err(e) => files
            .into_iter()
            .map(|(name, _)| UploadOutcome::failed(name, &e))
            .collect(),
    }
}

pub fn list_documents(state: &AppState, search_term: &str, page: usize) -> AppResult<DocumentPage> {
    let all = state.db.list_documents()?;
    Ok(DocumentPage::build(all, search_term, page))
}

pub fn document_preview(state: &AppState, id: &str) -> AppResult<DocumentPreview> {
    let not_found = || AppError::DocumentNotFound(id.to_string());
    let document = state.db.get_document(id)?.ok_or_else(not_found)?;
    let content = state.db.document_content(id)?.ok_or_else(not_found)?;
    Ok(DocumentPreview {
        document,
        preview: crate::rag::preview(&content, PREVIEW_CHARS),
    })
}

/// Returns `false` when no such document exists.
pub fn delete_document(state: &AppState, id: &str) -> AppResult<bool> {
    let Some(doc) = state.db.delete_document(id)? else {
        return Ok(false);
    };

    if state.db.document_ids_by_filename(&doc.filename)?.is_empty() {
        if let Err(e) = std::fs::remove_file(&doc.file_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %doc.file_path, error = %e, "failed to remove stored file");
            }
        }
    }

    tracing::info!(id, file = %doc.filename, "document deleted");
    Ok(true)
}
