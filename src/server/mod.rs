pub mod api;
pub mod error;
pub mod pages;

use axum::{
    extract::DefaultBodyLimit,
    response::Redirect,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Whole-request ceiling; one upload form post may carry several files.
const MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

/// `?q=&page=` shared by the admin page and the JSON listing.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub q: Option<String>,
    /// Text, so an empty jump-to-page box falls back to page 1 instead of
    /// failing extraction.
    pub page: Option<String>,
    pub preview: Option<String>,
    pub notice: Option<String>,
}

impl ListQuery {
    pub fn term(&self) -> &str {
        self.q.as_deref().unwrap_or("")
    }

    pub fn page(&self) -> usize {
        self.page
            .as_deref()
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(1)
    }
}

/// `/admin/documents?q=..&page=..`, omitting a blank search term.
pub fn documents_url(term: &str, page: usize) -> String {
    if term.trim().is_empty() {
        format!("/admin/documents?page={page}")
    } else {
        format!(
            "/admin/documents?q={}&page={page}",
            urlencoding::encode(term)
        )
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(pages::ask_page))
        .route("/ask", post(pages::ask))
        .route("/admin", get(|| async { Redirect::to("/admin/documents") }))
        .route("/admin/documents", get(pages::documents_page))
        .route("/admin/documents/upload", post(pages::upload))
        .route("/admin/documents/{id}/delete", post(pages::delete_document))
        .route(
            "/admin/settings",
            get(pages::settings_page).post(pages::submit_settings),
        )
        .route("/admin/settings/provider", post(pages::switch_provider))
        .route(
            "/admin/settings/test-connection",
            post(pages::test_connection),
        )
        .route("/api/health", get(api::health))
        .route("/api/ask", post(api::ask))
        .route("/api/documents", get(api::list_documents))
        .route(
            "/api/documents/{id}",
            get(api::get_document).delete(api::delete_document),
        )
        .route("/api/settings", get(api::get_settings))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
