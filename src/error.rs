use crate::config::ConfigError;
use crate::doc_processor::DocError;
use crate::embedding::EmbedError;
use crate::llm::LlmError;
use std::sync::PoisonError;
use thiserror::Error;

pub const SETTINGS_HINT: &str =
    "Check the model configuration and network proxy under Admin → Settings";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("No API key configured for {0}. Set one under Admin → Settings first")]
    MissingApiKey(String),
    #[error("The knowledge base is empty. Upload documents under Admin first")]
    EmptyKnowledgeBase,
    #[error("Please enter a question")]
    EmptyQuestion,
    #[error("Document not found: {0}")]
    DocumentNotFound(String),
    #[error("{0} contains no extractable text")]
    EmptyDocument(String),
    #[error("Invalid file name: {0:?}")]
    InvalidFileName(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Document(#[from] DocError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbedError),
    #[error("Model call failed: {0}")]
    Llm(#[from] LlmError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// Upstream failures (model, embedding, network) come with a pointer to
    /// the settings page.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            AppError::Embedding(_) | AppError::Llm(_) | AppError::MissingApiKey(_) => {
                Some(SETTINGS_HINT)
            }
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::MissingApiKey(_) => "missing_api_key",
            AppError::EmptyKnowledgeBase => "empty_knowledge_base",
            AppError::EmptyQuestion => "empty_question",
            AppError::DocumentNotFound(_) => "not_found",
            AppError::EmptyDocument(_) | AppError::InvalidFileName(_) | AppError::Document(_) => {
                "bad_document"
            }
            AppError::BadRequest(_) => "bad_request",
            AppError::Config(_) => "invalid_config",
            AppError::Embedding(_) | AppError::Llm(_) => "upstream_error",
            AppError::Db(_) | AppError::Io(_) | AppError::Internal(_) => "internal_error",
        }
    }
}

impl<T> From<PoisonError<T>> for AppError {
    fn from(e: PoisonError<T>) -> Self {
        AppError::Internal(format!("Lock poisoned: {e}"))
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_errors_carry_hint() {
        let err = AppError::Llm(LlmError::Api {
            status: 401,
            message: "bad key".into(),
        });
        assert_eq!(err.hint(), Some(SETTINGS_HINT));
        assert_eq!(err.kind(), "upstream_error");
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn test_local_errors_have_no_hint() {
        assert_eq!(AppError::EmptyQuestion.hint(), None);
        assert_eq!(AppError::DocumentNotFound("x".into()).kind(), "not_found");
    }
}
