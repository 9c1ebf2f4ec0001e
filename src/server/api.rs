use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::ListQuery;
use crate::commands::{chat, knowledge, settings};
use crate::error::{AppError, AppResult};
use crate::listing::DocumentPage;
use crate::rag::RagAnswer;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    documents: usize,
}

#[derive(Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: String,
}

/// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> AppResult<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        documents: state.db.count_documents()?,
    }))
}

/// POST /api/ask
pub async fn ask(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> AppResult<Json<RagAnswer>> {
    let Json(req) = payload?;
    Ok(Json(chat::ask(&state, &req.question).await?))
}

/// GET /api/documents?q=&page=
pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<DocumentPage>> {
    let page = knowledge::list_documents(&state, query.term(), query.page())?;
    Ok(Json(page))
}

pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<knowledge::DocumentPreview>> {
    Ok(Json(knowledge::document_preview(&state, &id)?))
}

pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    if knowledge::delete_document(&state, &id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::DocumentNotFound(id))
    }
}

pub async fn get_settings(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<settings::SettingsView>> {
    let config = state.config()?;
    Ok(Json(settings::settings_view(&config)?))
}
