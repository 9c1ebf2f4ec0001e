use askama::Template;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;
use std::sync::Arc;

use super::{documents_url, ListQuery};
use crate::commands::chat::{self, AskOverview};
use crate::commands::knowledge::{self, DocumentPreview, UploadOutcome};
use crate::commands::settings::{self, ConnectionReport, SettingsForm, SettingsView};
use crate::doc_processor::ACCEPTED_EXTENSIONS;
use crate::error::{AppError, AppResult};
use crate::listing::DocumentPage;
use crate::rag::RagAnswer;
use crate::state::AppState;

fn render_template<T: Template>(template: &T) -> Response {
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!("Template render error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Template error: {}", e),
            )
                .into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Ask
// ---------------------------------------------------------------------------

#[derive(Template)]
#[template(path = "ask.html")]
pub struct AskTemplate {
    overview: AskOverview,
    question: String,
    answer: Option<RagAnswer>,
    error: Option<String>,
    hint: Option<&'static str>,
}

#[derive(Deserialize)]
pub struct AskForm {
    #[serde(default)]
    pub question: String,
}

/// Preconditions read as instructions; anything else is a failed query.
fn ask_error_message(err: &AppError) -> String {
    match err {
        AppError::EmptyKnowledgeBase | AppError::EmptyQuestion | AppError::MissingApiKey(_) => {
            err.to_string()
        }
        other => format!("Query failed: {other}"),
    }
}

/// GET /
pub async fn ask_page(State(state): State<Arc<AppState>>) -> AppResult<Response> {
    Ok(render_template(&AskTemplate {
        overview: chat::overview(&state)?,
        question: String::new(),
        answer: None,
        error: None,
        hint: None,
    }))
}

/// POST /ask
pub async fn ask(
    State(state): State<Arc<AppState>>,
    Form(form): Form<AskForm>,
) -> AppResult<Response> {
    let overview = chat::overview(&state)?;
    let (answer, error, hint) = match chat::ask(&state, &form.question).await {
        Ok(answer) => (Some(answer), None, None),
        Err(e) => (None, Some(ask_error_message(&e)), e.hint()),
    };

    Ok(render_template(&AskTemplate {
        overview,
        question: form.question,
        answer,
        error,
        hint,
    }))
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

pub struct DocumentRow {
    id: String,
    short_id: String,
    filename: String,
    file_type: String,
    chunk_count: usize,
    created_at: String,
    size: String,
    preview_url: String,
    delete_url: String,
    previewing: bool,
}

#[derive(Template)]
#[template(path = "documents.html")]
pub struct DocumentsTemplate {
    listing: DocumentPage,
    rows: Vec<DocumentRow>,
    preview: Option<DocumentPreview>,
    uploads: Vec<UploadOutcome>,
    notice: Option<String>,
    prev_url: String,
    next_url: String,
    accept: String,
}

fn human_size(bytes: Option<i64>) -> String {
    match bytes {
        None => "-".to_string(),
        Some(b) if b < 1024 => format!("{b} B"),
        Some(b) if b < 1024 * 1024 => format!("{:.1} KB", b as f64 / 1024.0),
        Some(b) => format!("{:.1} MB", b as f64 / (1024.0 * 1024.0)),
    }
}

fn notice_text(code: Option<&str>) -> Option<String> {
    match code? {
        "deleted" => Some("Document deleted.".to_string()),
        "missing" => Some("That document no longer exists.".to_string()),
        _ => None,
    }
}

fn documents_template(
    state: &AppState,
    query: &ListQuery,
    uploads: Vec<UploadOutcome>,
    mut notice: Option<String>,
) -> AppResult<DocumentsTemplate> {
    let listing = knowledge::list_documents(state, query.term(), query.page())?;
    let term = listing.search_term.clone();
    let page_url = documents_url(&term, listing.page);

    let preview_id = query.preview.as_deref().filter(|id| !id.is_empty());
    let preview = match preview_id {
        Some(id) => match knowledge::document_preview(state, id) {
            Ok(preview) => Some(preview),
            Err(AppError::DocumentNotFound(_)) => {
                notice = notice_text(Some("missing"));
                None
            }
            Err(e) => return Err(e),
        },
        None => None,
    };

    let rows = listing
        .items
        .iter()
        .map(|doc| {
            let previewing = preview_id == Some(doc.id.as_str());
            DocumentRow {
                short_id: doc.short_id().to_string(),
                preview_url: if previewing {
                    page_url.clone()
                } else {
                    format!("{page_url}&preview={}", urlencoding::encode(&doc.id))
                },
                delete_url: format!("/admin/documents/{}/delete", urlencoding::encode(&doc.id)),
                id: doc.id.clone(),
                filename: doc.filename.clone(),
                file_type: doc.file_type.clone(),
                chunk_count: doc.chunk_count,
                created_at: doc.created_at.clone(),
                size: human_size(doc.file_size),
                previewing,
            }
        })
        .collect();

    Ok(DocumentsTemplate {
        prev_url: documents_url(&term, listing.page.saturating_sub(1).max(1)),
        next_url: documents_url(&term, (listing.page + 1).min(listing.total_pages)),
        accept: ACCEPTED_EXTENSIONS
            .iter()
            .map(|ext| format!(".{ext}"))
            .collect::<Vec<_>>()
            .join(","),
        listing,
        rows,
        preview,
        uploads,
        notice,
    })
}

/// GET /admin/documents
pub async fn documents_page(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> AppResult<Response> {
    let notice = notice_text(query.notice.as_deref());
    let template = documents_template(&state, &query, Vec::new(), notice)?;
    Ok(render_template(&template))
}

/// POST /admin/documents/upload
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        files.push((name, bytes.to_vec()));
    }

    let (uploads, notice) = if files.is_empty() {
        (Vec::new(), Some("Choose at least one file to upload.".to_string()))
    } else {
        tracing::info!(files = files.len(), "processing upload");
        (knowledge::upload_documents(&state, files).await, None)
    };

    let template = documents_template(&state, &ListQuery::default(), uploads, notice)?;
    Ok(render_template(&template))
}

#[derive(Deserialize)]
pub struct DeleteForm {
    #[serde(default)]
    pub q: String,
}

/// POST /admin/documents/{id}/delete, then back to page 1 of the same search.
pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Form(form): Form<DeleteForm>,
) -> AppResult<Redirect> {
    let notice = if knowledge::delete_document(&state, &id)? {
        "deleted"
    } else {
        "missing"
    };
    Ok(Redirect::to(&format!(
        "{}&notice={notice}",
        documents_url(&form.q, 1)
    )))
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Template)]
#[template(path = "settings.html")]
pub struct SettingsTemplate {
    view: SettingsView,
    message: Option<String>,
    success: bool,
    report: Option<ConnectionReport>,
}

fn settings_template(
    state: &AppState,
    message: Option<String>,
    success: bool,
    report: Option<ConnectionReport>,
) -> AppResult<SettingsTemplate> {
    let config = state.config()?;
    Ok(SettingsTemplate {
        view: settings::settings_view(&config)?,
        message,
        success,
        report,
    })
}

/// GET /admin/settings
pub async fn settings_page(State(state): State<Arc<AppState>>) -> AppResult<Response> {
    Ok(render_template(&settings_template(&state, None, true, None)?))
}

/// POST /admin/settings: apply in memory, or apply and save.
pub async fn submit_settings(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SettingsForm>,
) -> AppResult<Response> {
    let result = if form.wants_save() {
        settings::save_settings(&state, &form).map(|_| {
            format!(
                "Settings saved to {}.",
                state.paths.config_file.display()
            )
        })
    } else {
        settings::update_settings(&state, &form)
            .map(|_| "Settings applied for this session. Save to keep them.".to_string())
    };

    let (message, success) = match result {
        Ok(message) => (message, true),
        Err(e @ AppError::Config(_)) => (e.to_string(), false),
        Err(e) => return Err(e),
    };
    Ok(render_template(&settings_template(
        &state,
        Some(message),
        success,
        None,
    )?))
}

#[derive(Deserialize)]
pub struct ProviderForm {
    pub provider: String,
}

/// POST /admin/settings/provider
pub async fn switch_provider(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ProviderForm>,
) -> AppResult<Redirect> {
    settings::switch_provider(&state, &form.provider)?;
    Ok(Redirect::to("/admin/settings"))
}

#[derive(Deserialize)]
pub struct TestConnectionForm {
    pub show_detail: Option<String>,
}

/// POST /admin/settings/test-connection
pub async fn test_connection(
    State(state): State<Arc<AppState>>,
    Form(form): Form<TestConnectionForm>,
) -> AppResult<Response> {
    let config = state.config()?;
    let report = settings::test_connection(&config, form.show_detail.is_some()).await;
    Ok(render_template(&settings_template(
        &state,
        None,
        report.success,
        Some(report),
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(None), "-");
        assert_eq!(human_size(Some(512)), "512 B");
        assert_eq!(human_size(Some(2048)), "2.0 KB");
        assert_eq!(human_size(Some(3 * 1024 * 1024)), "3.0 MB");
    }

    #[test]
    fn test_ask_error_message() {
        assert_eq!(
            ask_error_message(&AppError::EmptyQuestion),
            "Please enter a question"
        );
        let upstream = AppError::Internal("embedding endpoint returned no vector".into());
        assert!(ask_error_message(&upstream).starts_with("Query failed: "));
    }

    #[test]
    fn test_notice_codes() {
        assert_eq!(notice_text(Some("deleted")).as_deref(), Some("Document deleted."));
        assert!(notice_text(Some("other")).is_none());
        assert!(notice_text(None).is_none());
    }
}
