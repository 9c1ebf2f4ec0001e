use serde::Serialize;

use crate::db::models::ScoredChunk;
use crate::db::Database;
use crate::embedding::Embedder;
use crate::error::{AppError, AppResult};
use crate::llm::{ChatMessage, ChatModel};

/// System prompt. `{context}` is replaced with the retrieved passages.
pub const SYSTEM_PROMPT: &str = "You are a rigorous and helpful AI assistant. Answer the question using only the retrieved context below.\n\
If the context does not contain the relevant information, answer \"I don't know\" and do not make anything up.\n\n\
Context:\n{context}";

pub const SOURCE_PREVIEW_CHARS: usize = 800;

#[derive(Debug, Clone, Serialize)]
pub struct SourcePassage {
    /// 1-based position in the answer's source list.
    pub index: usize,
    pub source: String,
    pub document_id: String,
    pub preview: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub answer: String,
    pub model: String,
    pub sources: Vec<SourcePassage>,
}

/// Passages are stuffed into the prompt in retrieval order, separated by a
/// blank line.
pub fn build_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.chunk.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_messages(question: &str, context: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT.replace("{context}", context)),
        ChatMessage::user(question),
    ]
}

/// Cut to `max_chars` characters, appending "..." when something was dropped.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

pub async fn retrieve(
    db: &Database,
    embedder: &dyn Embedder,
    question: &str,
    top_k: usize,
) -> AppResult<Vec<ScoredChunk>> {
    let query = embedder.embed(&[question.to_string()]).await?;
    let query = query
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Internal("embedding endpoint returned no vector".into()))?;
    db.search_chunks(&query, top_k.max(1))
}

/// Retrieve, stuff, generate.
pub async fn answer(
    db: &Database,
    embedder: &dyn Embedder,
    llm: &dyn ChatModel,
    question: &str,
    top_k: usize,
) -> AppResult<RagAnswer> {
    let hits = retrieve(db, embedder, question, top_k).await?;
    tracing::info!(passages = hits.len(), top_k, "retrieved context");

    let context = build_context(&hits);
    let response = llm.chat(build_messages(question, &context)).await?;

    let sources = hits
        .into_iter()
        .enumerate()
        .map(|(i, hit)| SourcePassage {
            index: i + 1,
            preview: preview(&hit.chunk.content, SOURCE_PREVIEW_CHARS),
            source: hit.chunk.filename,
            document_id: hit.chunk.document_id,
            score: hit.score,
        })
        .collect();

    Ok(RagAnswer {
        answer: response.content,
        model: response.model,
        sources,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Chunk, NewChunk, NewDocument};
    use crate::embedding::EmbedError;
    use crate::llm::{ChatResponse, LlmError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Maps a text onto two axes: "leave" vs everything else.
    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("leave") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }
    }

    #[derive(Default)]
    struct RecordingModel {
        seen: Mutex<Vec<ChatMessage>>,
    }

    #[async_trait]
    impl ChatModel for RecordingModel {
        async fn chat(&self, messages: Vec<ChatMessage>) -> Result<ChatResponse, LlmError> {
            self.seen.lock().unwrap().extend(messages);
            Ok(ChatResponse {
                content: "15 days".into(),
                model: "fake-model".into(),
            })
        }
    }

    struct FailingModel;

    #[async_trait]
    impl ChatModel for FailingModel {
        async fn chat(&self, _messages: Vec<ChatMessage>) -> Result<ChatResponse, LlmError> {
            Err(LlmError::Api {
                status: 503,
                message: "overloaded".into(),
            })
        }
    }

    fn seeded_db() -> Database {
        let db = Database::in_memory().unwrap();
        db.insert_document(
            &NewDocument {
                filename: "handbook.md".into(),
                file_type: "md".into(),
                file_path: "data/handbook.md".into(),
                file_size: None,
                content: String::new(),
            },
            &[
                NewChunk {
                    content: "Annual leave is 15 days.".into(),
                    embedding: vec![1.0, 0.0],
                },
                NewChunk {
                    content: "The office opens at 9.".into(),
                    embedding: vec![0.0, 1.0],
                },
            ],
        )
        .unwrap();
        db
    }

    fn scored(content: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id: "c".into(),
                document_id: "d".into(),
                filename: "f.txt".into(),
                content: content.into(),
                chunk_index: 0,
            },
            score: 1.0,
        }
    }

    #[test]
    fn test_build_context_joins_passages() {
        let context = build_context(&[scored("one"), scored("two")]);
        assert_eq!(context, "one\n\ntwo");
    }

    #[test]
    fn test_build_messages_embeds_context() {
        let messages = build_messages("What is the leave policy?", "Annual leave is 15 days.");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.ends_with("Context:\nAnnual leave is 15 days."));
        assert!(messages[0].content.contains("I don't know"));
        assert_eq!(messages[1], ChatMessage::user("What is the leave policy?"));
    }

    #[test]
    fn test_preview_truncates_on_chars() {
        assert_eq!(preview("short", 800), "short");
        assert_eq!(preview("年假政策说明", 2), "年假...");
        assert_eq!(preview("abc", 3), "abc");
    }

    #[tokio::test]
    async fn test_answer_uses_most_similar_passage() {
        let db = seeded_db();
        let model = RecordingModel::default();

        let result = answer(&db, &AxisEmbedder, &model, "How much leave do I get?", 1)
            .await
            .unwrap();

        assert_eq!(result.answer, "15 days");
        assert_eq!(result.model, "fake-model");
        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.sources[0].index, 1);
        assert_eq!(result.sources[0].source, "handbook.md");
        assert_eq!(result.sources[0].preview, "Annual leave is 15 days.");

        let seen = model.seen.lock().unwrap();
        assert!(seen[0].content.contains("Annual leave is 15 days."));
        assert!(!seen[0].content.contains("office opens"));
    }

    #[tokio::test]
    async fn test_answer_with_empty_store_has_no_sources() {
        let db = Database::in_memory().unwrap();
        let result = answer(&db, &AxisEmbedder, &RecordingModel::default(), "anything", 4)
            .await
            .unwrap();
        assert!(result.sources.is_empty());
    }

    #[tokio::test]
    async fn test_model_failure_propagates() {
        let db = seeded_db();
        let err = answer(&db, &AxisEmbedder, &FailingModel, "leave?", 4)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Llm(LlmError::Api { status: 503, .. })));
        assert!(err.hint().is_some());
    }
}
