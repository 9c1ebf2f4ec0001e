use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::config::ConfigError;
use crate::error::AppError;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'static str>,
}

pub fn status_of(err: &AppError) -> StatusCode {
    match err {
        AppError::EmptyQuestion
        | AppError::EmptyDocument(_)
        | AppError::InvalidFileName(_)
        | AppError::BadRequest(_)
        | AppError::Document(_) => StatusCode::BAD_REQUEST,
        AppError::Config(ConfigError::Read { .. } | ConfigError::Write { .. }) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        AppError::Config(_) => StatusCode::BAD_REQUEST,
        AppError::DocumentNotFound(_) => StatusCode::NOT_FOUND,
        AppError::MissingApiKey(_) | AppError::EmptyKnowledgeBase => {
            StatusCode::PRECONDITION_FAILED
        }
        AppError::Embedding(_) | AppError::Llm(_) => StatusCode::BAD_GATEWAY,
        AppError::Db(_) | AppError::Io(_) | AppError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Malformed JSON bodies get the same `{error, message}` shape as every
/// other failure.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_of(&self);
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorBody {
            error: self.kind().into(),
            message: self.to_string(),
            hint: self.hint(),
        };
        (status, Json(body)).into_response()
    }
}
