//! Retrieval-augmented answering.
//!
//! Each question runs one sequential chain: index any newly selected files,
//! retrieve the top chunks within the selection, and make a single
//! completion call.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::db::models::ConversationTurn;
use crate::error::AppError;
use crate::index::{FileOutcome, IndexClient, RetrievedChunk};
use crate::llm::{ChatMessage, ChatModel, ChatRequest};

/// Fixed instruction sent first unless history is ignored.
pub const DIDACTIC_SYSTEM_PROMPT: &str = "You are a highly qualified assistant. Always answer in an \
explanatory, didactic and complete way, with examples and clarity. Avoid short answers. Structure \
the answer as if you were teaching the subject.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    /// Distinct source files of the retrieved chunks, comma-joined.
    pub sources: String,
}

impl Answer {
    pub fn sources_opt(&self) -> Option<&str> {
        (!self.sources.is_empty()).then_some(self.sources.as_str())
    }
}

/// Per-question knobs copied out of [`AppConfig`].
#[derive(Debug, Clone)]
pub struct RagSettings {
    pub upload_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl From<&AppConfig> for RagSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            upload_dir: config.upload_dir.clone(),
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            top_k: config.top_k,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// Files vectorized during this session, so repeated questions over the
/// same selection do not re-embed them.
#[derive(Debug, Default)]
pub struct Session {
    indexed: HashSet<String>,
}

impl Session {
    pub fn is_indexed(&self, file: &str) -> bool {
        self.indexed.contains(file)
    }

    /// Treat `files` as already vectorized (e.g. found in the persistent index).
    pub fn mark_indexed<I: IntoIterator<Item = String>>(&mut self, files: I) {
        self.indexed.extend(files);
    }

    pub fn forget(&mut self, file: &str) {
        self.indexed.remove(file);
    }

    /// Forget everything so the next question re-indexes its selection.
    pub fn reset(&mut self) {
        self.indexed.clear();
    }
}

pub struct AnswerEngine {
    index: IndexClient,
    settings: RagSettings,
    session: Session,
}

impl AnswerEngine {
    pub fn new(index: IndexClient, settings: RagSettings) -> Self {
        Self {
            index,
            settings,
            session: Session::default(),
        }
    }

    pub fn index(&self) -> &IndexClient {
        &self.index
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Drop `files` from the index and the session, e.g. after they were
    /// deleted, moved or overwritten.
    pub fn forget_files(&mut self, files: &[String]) -> Result<(), AppError> {
        let removed = self.index.store().remove_sources(files)?;
        for file in files {
            self.session.forget(file);
        }
        debug!("dropped {} vector(s) for {:?}", removed, files);
        Ok(())
    }

    /// Empty the index and the session; the next question re-vectorizes
    /// its whole selection.
    pub fn reset_index(&mut self) -> Result<(), AppError> {
        self.index.store().clear()?;
        self.session.reset();
        info!("vector index cleared");
        Ok(())
    }

    /// Vectorize selected files not yet seen this session. Returns the
    /// selected files that have content in the index.
    pub async fn prepare(&mut self, selected: &[String]) -> Result<Vec<String>, AppError> {
        let pending: Vec<String> = selected
            .iter()
            .filter(|f| !self.session.indexed.contains(*f))
            .cloned()
            .collect();

        if !pending.is_empty() {
            let report = self
                .index
                .build_index(
                    &self.settings.upload_dir,
                    &pending,
                    self.settings.chunk_size,
                    self.settings.chunk_overlap,
                )
                .await?;
            // Empty or failed files stay pending and are retried next question.
            for (file, outcome) in report {
                if let FileOutcome::Chunked(_) = outcome {
                    self.session.indexed.insert(file);
                }
            }
        }

        let in_scope: Vec<String> = selected
            .iter()
            .filter(|f| self.session.indexed.contains(*f))
            .cloned()
            .collect();
        if in_scope.is_empty() {
            return Err(AppError::NoContent);
        }
        Ok(in_scope)
    }

    /// Answer `question` over `selected_files`.
    ///
    /// `history` is replayed after the system instruction; with
    /// `ignore_history` neither is sent. Nothing reaches the chat model when
    /// the selection has no indexed content.
    pub async fn answer(
        &mut self,
        chat: &dyn ChatModel,
        model: &str,
        selected_files: &[String],
        question: &str,
        ignore_history: bool,
        history: &[ConversationTurn],
    ) -> Result<Answer, AppError> {
        let scope = self.prepare(selected_files).await?;
        let retrieved = self
            .index
            .query(question, self.settings.top_k, Some(&scope))
            .await?;
        if retrieved.is_empty() {
            return Err(AppError::NoContent);
        }

        let request = ChatRequest {
            messages: build_messages(question, &retrieved, ignore_history, history),
            model: model.to_string(),
            temperature: Some(self.settings.temperature),
            max_tokens: Some(self.settings.max_tokens),
        };
        let response = chat.complete(&request).await?;

        Ok(Answer {
            text: response.content,
            sources: join_sources(&retrieved),
        })
    }
}

/// Assemble the message list for one completion.
pub fn build_messages(
    question: &str,
    retrieved: &[RetrievedChunk],
    ignore_history: bool,
    history: &[ConversationTurn],
) -> Vec<ChatMessage> {
    let mut messages = Vec::new();
    if !ignore_history {
        messages.push(ChatMessage::system(DIDACTIC_SYSTEM_PROMPT));
        for turn in history {
            messages.push(ChatMessage::user(turn.question.clone()));
            messages.push(ChatMessage::assistant(turn.answer.clone()));
        }
    }
    messages.push(ChatMessage::user(question_with_context(question, retrieved)));
    messages
}

fn question_with_context(question: &str, retrieved: &[RetrievedChunk]) -> String {
    let mut prompt = String::from(
        "Use the following extracts from the selected documents to answer the question. \
         If the extracts do not contain the answer, say so.\n\n",
    );
    for hit in retrieved {
        prompt.push_str(&format!(
            "Content: {}\nSource: {} (page {})\n\n",
            hit.chunk.content, hit.chunk.source, hit.chunk.page
        ));
    }
    prompt.push_str(&format!("Question: {}", question));
    prompt
}

/// Distinct sources in rank order.
pub fn join_sources(retrieved: &[RetrievedChunk]) -> String {
    let mut seen: Vec<&str> = Vec::new();
    for hit in retrieved {
        if !seen.contains(&hit.chunk.source.as_str()) {
            seen.push(&hit.chunk.source);
        }
    }
    seen.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc_processor::Chunk;
    use crate::index::tests::LetterEmbedder;
    use crate::index::VectorIndex;
    use crate::llm::{ChatResponse, LlmError};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingChat {
        requests: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait::async_trait]
    impl ChatModel for RecordingChat {
        async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(ChatResponse {
                content: "X is a letter.".into(),
                model: request.model.clone(),
            })
        }
    }

    struct FailingChat;

    #[async_trait::async_trait]
    impl ChatModel for FailingChat {
        async fn complete(&self, _: &ChatRequest) -> Result<ChatResponse, LlmError> {
            Err(LlmError::Api {
                status: 500,
                message: "boom".into(),
            })
        }
    }

    fn engine(dir: &std::path::Path) -> AnswerEngine {
        let mut config = AppConfig::rooted_at(dir);
        config.chunk_size = 50;
        config.chunk_overlap = 10;
        std::fs::create_dir_all(&config.upload_dir).unwrap();
        AnswerEngine::new(
            IndexClient::new(
                VectorIndex::open_in_memory().unwrap(),
                Arc::new(LetterEmbedder::default()),
            ),
            RagSettings::from(&config),
        )
    }

    fn hit(source: &str) -> RetrievedChunk {
        RetrievedChunk {
            id: 1,
            chunk: Chunk {
                source: source.into(),
                page: 1,
                chunk_index: 0,
                content: "text".into(),
            },
            score: 1.0,
        }
    }

    #[test]
    fn test_ignore_history_omits_system_prompt() {
        let history = vec![ConversationTurn {
            id: 1,
            model: "gpt-4o".into(),
            question: "earlier".into(),
            answer: "before".into(),
            sources: None,
            created_at: String::new(),
        }];

        let messages = build_messages("What is X?", &[hit("doc1.txt")], true, &history);
        assert_eq!(messages.len(), 1);
        assert!(messages.iter().all(|m| m.role != "system"));

        let messages = build_messages("What is X?", &[hit("doc1.txt")], false, &history);
        assert_eq!(messages[0], ChatMessage::system(DIDACTIC_SYSTEM_PROMPT));
        assert_eq!(messages[1].content, "earlier");
        assert_eq!(messages[2].role, "assistant");
        assert!(messages[3].content.ends_with("Question: What is X?"));
        assert!(messages[3].content.contains("Source: doc1.txt"));
    }

    #[test]
    fn test_join_sources_distinct_in_rank_order() {
        let hits = vec![hit("b.pdf"), hit("a.txt"), hit("b.pdf")];
        assert_eq!(join_sources(&hits), "b.pdf, a.txt");
        assert_eq!(join_sources(&[]), "");
    }

    #[tokio::test]
    async fn test_no_content_never_calls_chat() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path());
        let chat = RecordingChat::default();

        let err = engine
            .answer(&chat, "gpt-4o", &[], "What is X?", false, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoContent));

        std::fs::write(engine.settings.upload_dir.join("blank.txt"), "  ").unwrap();
        let err = engine
            .answer(&chat, "gpt-4o", &["blank.txt".into(), "gone.txt".into()], "What is X?", false, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoContent));
        assert!(chat.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_answer_returns_sources_and_indexes_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path());
        std::fs::write(engine.settings.upload_dir.join("doc1.txt"), "X is the letter after W.").unwrap();
        let chat = RecordingChat::default();
        let files = vec!["doc1.txt".to_string()];

        let answer = engine
            .answer(&chat, "gpt-4o", &files, "What is X?", true, &[])
            .await
            .unwrap();
        assert_eq!(answer.text, "X is a letter.");
        assert_eq!(answer.sources, "doc1.txt");
        assert!(engine.session().is_indexed("doc1.txt"));

        engine
            .answer(&chat, "gpt-4o", &files, "And W?", false, &[])
            .await
            .unwrap();
        assert_eq!(engine.index().store().count().unwrap(), 1);

        let requests = chat.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].messages.iter().all(|m| m.role != "system"));
        assert_eq!(requests[1].messages[0].role, "system");
        assert_eq!(requests[0].max_tokens, Some(1500));
    }

    #[tokio::test]
    async fn test_forget_files_reindexes_on_next_question() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path());
        let doc = engine.settings.upload_dir.join("doc1.txt");
        std::fs::write(&doc, "first version").unwrap();
        let files = vec!["doc1.txt".to_string()];
        let chat = RecordingChat::default();

        engine.answer(&chat, "gpt-4o", &files, "q", true, &[]).await.unwrap();
        std::fs::write(&doc, "second version").unwrap();
        engine.forget_files(&files).unwrap();
        assert!(!engine.session().is_indexed("doc1.txt"));

        engine.answer(&chat, "gpt-4o", &files, "q", true, &[]).await.unwrap();
        let hits = engine.index().query("second", 5, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.content, "second version");

        engine.reset_index().unwrap();
        assert_eq!(engine.index().store().count().unwrap(), 0);
        assert!(!engine.session().is_indexed("doc1.txt"));
    }

    #[tokio::test]
    async fn test_chat_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path());
        std::fs::write(engine.settings.upload_dir.join("doc1.txt"), "content").unwrap();

        let err = engine
            .answer(&FailingChat, "gpt-4o", &["doc1.txt".into()], "q", false, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Llm(LlmError::Api { status: 500, .. })));
    }
}
