use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::rag::{self, RagAnswer};
use crate::state::AppState;

/// What the Ask page shows above the question box.
#[derive(Debug, Clone, Serialize)]
pub struct AskOverview {
    pub provider_name: String,
    pub model_name: String,
    pub document_count: usize,
}

pub fn overview(state: &AppState) -> AppResult<AskOverview> {
    let config = state.config()?;
    let provider = config.active_provider()?;
    Ok(AskOverview {
        provider_name: provider.name.clone(),
        model_name: provider.model_name.clone(),
        document_count: state.db.count_documents()?,
    })
}

/// Answer a question from the knowledge base with the active provider.
///
/// Preconditions are checked in the order the page presents them: an empty
/// knowledge base, then a blank question, then a missing API key.
pub async fn ask(state: &AppState, question: &str) -> AppResult<RagAnswer> {
    if state.db.count_documents()? == 0 {
        return Err(AppError::EmptyKnowledgeBase);
    }

    let question = question.trim();
    if question.is_empty() {
        return Err(AppError::EmptyQuestion);
    }

    let config = state.config()?;
    let llm = state.llm(&config)?;
    let embedder = state.embedder(&config)?;

    tracing::info!(provider = %config.model_provider, model = llm.model(), "answering question");
    let result = rag::answer(
        &state.db,
        embedder.as_ref(),
        llm.as_ref(),
        question,
        config.rag_settings.retriever_k,
    )
    .await;

    if let Err(e) = &result {
        tracing::error!(error = %e, "query failed");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, AppPaths};
    use crate::db::models::NewDocument;
    use crate::db::Database;
    use std::sync::Arc;

    fn state_with_document() -> Arc<AppState> {
        let db = Database::in_memory().unwrap();
        db.insert_document(
            &NewDocument {
                filename: "a.txt".into(),
                file_type: "txt".into(),
                file_path: "data/a.txt".into(),
                file_size: None,
                content: "text".into(),
            },
            &[],
        )
        .unwrap();
        AppState::new(AppPaths::new("/tmp/kbqa-chat-test"), AppConfig::default(), db)
    }

    #[tokio::test]
    async fn test_empty_knowledge_base_stops_first() {
        let state = AppState::new(
            AppPaths::new("/tmp/kbqa-chat-test"),
            AppConfig::default(),
            Database::in_memory().unwrap(),
        );
        assert!(matches!(ask(&state, "").await, Err(AppError::EmptyKnowledgeBase)));
    }

    #[tokio::test]
    async fn test_blank_question_rejected() {
        let state = state_with_document();
        assert!(matches!(ask(&state, "  \n").await, Err(AppError::EmptyQuestion)));
    }

    #[tokio::test]
    async fn test_missing_api_key_is_precondition() {
        let state = state_with_document();
        let err = ask(&state, "What is the leave policy?").await.unwrap_err();
        assert!(matches!(err, AppError::MissingApiKey(_)));
        assert!(err.to_string().contains("Settings"));
    }

    #[test]
    fn test_overview_reports_active_provider() {
        let state = state_with_document();
        state
            .update_config(|c| Ok(c.switch_provider("openai")?))
            .unwrap();

        let overview = overview(&state).unwrap();
        assert_eq!(overview.provider_name, "OpenAI");
        assert_eq!(overview.model_name, "gpt-4o-mini");
        assert_eq!(overview.document_count, 1);
    }
}
