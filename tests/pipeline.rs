use async_trait::async_trait;
use docchat::commands::chat::{self, AskInput};
use docchat::commands::library;
use docchat::embedding::EmbeddingProvider;
use docchat::llm::{ChatModel, ChatRequest, ChatResponse, LlmError};
use docchat::{App, AppConfig, AppError};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Counts letters, enough for similarity between short texts.
#[derive(Default)]
struct LetterEmbedder {
    texts_embedded: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for LetterEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0; 26];
                for c in t.to_lowercase().chars().filter(char::is_ascii_lowercase) {
                    v[(c as u8 - b'a') as usize] += 1.0;
                }
                v
            })
            .collect())
    }
}

#[derive(Default)]
struct ScriptedChat {
    requests: Mutex<Vec<ChatRequest>>,
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());
        Ok(ChatResponse {
            content: format!("answer {}", requests.len()),
            model: request.model.clone(),
        })
    }
}

struct DownChat;

#[async_trait]
impl ChatModel for DownChat {
    async fn complete(&self, _: &ChatRequest) -> Result<ChatResponse, LlmError> {
        Err(LlmError::Api {
            status: 503,
            message: "unavailable".into(),
        })
    }
}

fn open(dir: &Path, embedder: Arc<LetterEmbedder>) -> App {
    App::with_embedder(AppConfig::rooted_at(dir), embedder).unwrap()
}

fn ask(question: &str, files: &[&str], ignore_history: bool) -> AskInput {
    AskInput {
        question: question.into(),
        files: files.iter().map(|f| f.to_string()).collect(),
        model: None,
        ignore_history,
    }
}

#[tokio::test]
async fn test_upload_ask_and_history() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = Arc::new(LetterEmbedder::default());
    let mut app = open(dir.path(), embedder.clone());

    let incoming = dir.path().join("incoming");
    fs::create_dir_all(&incoming).unwrap();
    fs::write(incoming.join("doc1.txt"), "X is the letter after W.").unwrap();
    fs::write(incoming.join("notes.csv"), "term,meaning\nX,a letter\n").unwrap();
    library::upload_documents(&mut app, &[incoming.join("doc1.txt")], None).unwrap();
    library::upload_documents(&mut app, &[incoming.join("notes.csv")], Some("glossary")).unwrap();

    let chat_model = ScriptedChat::default();
    let turn = chat::ask_with(
        &mut app,
        &chat_model,
        "gpt-4o",
        &ask("What is X?", &["doc1.txt", "glossary/notes.csv"], false),
    )
    .await
    .unwrap();
    assert_eq!(turn.id, 1);
    assert_eq!(turn.answer, "answer 1");
    let sources = turn.source_list();
    assert!(sources.contains(&"doc1.txt".to_string()));
    assert!(sources.contains(&"glossary/notes.csv".to_string()));
    let embedded_after_first = embedder.texts_embedded.load(Ordering::SeqCst);

    // The second question replays the first turn and re-embeds only the query.
    chat::ask_with(&mut app, &chat_model, "gpt-4o", &ask("And W?", &["doc1.txt"], false))
        .await
        .unwrap();
    assert_eq!(embedder.texts_embedded.load(Ordering::SeqCst), embedded_after_first + 1);
    {
        let requests = chat_model.requests.lock().unwrap();
        let second = &requests[1].messages;
        assert_eq!(second[0].role, "system");
        assert_eq!(second[1].content, "What is X?");
        assert_eq!(second[2].content, "answer 1");
        assert!(second.last().unwrap().content.ends_with("Question: And W?"));
    }

    let history = chat::history(&app).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].sources.as_deref(), Some("doc1.txt"));

    chat::clear_history(&app).unwrap();
    assert!(chat::history(&app).unwrap().is_empty());
    let turn = chat::ask_with(&mut app, &chat_model, "gpt-4o", &ask("Again?", &["doc1.txt"], true))
        .await
        .unwrap();
    assert_eq!(turn.id, 1);
}

#[tokio::test]
async fn test_failures_save_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = open(dir.path(), Arc::new(LetterEmbedder::default()));
    fs::write(app.upload_dir().join("empty.txt"), "   ").unwrap();
    fs::write(app.upload_dir().join("doc.txt"), "content").unwrap();

    let chat_model = ScriptedChat::default();
    let err = chat::ask_with(&mut app, &chat_model, "gpt-4o", &ask("q", &["empty.txt"], false))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NoContent));
    assert!(chat_model.requests.lock().unwrap().is_empty());

    let err = chat::ask_with(&mut app, &DownChat, "gpt-4o", &ask("q", &["doc.txt"], false))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Llm(LlmError::Api { status: 503, .. })));

    assert!(chat::history(&app).unwrap().is_empty());
}

#[tokio::test]
async fn test_index_survives_restart_until_reindex() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = Arc::new(LetterEmbedder::default());
    {
        let mut app = open(dir.path(), embedder.clone());
        fs::write(app.upload_dir().join("doc.txt"), "persistent words").unwrap();
        chat::ask_with(&mut app, &ScriptedChat::default(), "gpt-4o", &ask("words?", &["doc.txt"], true))
            .await
            .unwrap();
    }
    let embedded = embedder.texts_embedded.load(Ordering::SeqCst);

    let mut app = open(dir.path(), embedder.clone());
    assert_eq!(library::index_status(&app).unwrap(), vec![("doc.txt".to_string(), 1)]);
    chat::ask_with(&mut app, &ScriptedChat::default(), "gpt-4o", &ask("words?", &["doc.txt"], true))
        .await
        .unwrap();
    assert_eq!(embedder.texts_embedded.load(Ordering::SeqCst), embedded + 1);

    library::reindex(&mut app).unwrap();
    assert!(library::index_status(&app).unwrap().is_empty());
    chat::ask_with(&mut app, &ScriptedChat::default(), "gpt-4o", &ask("words?", &["doc.txt"], true))
        .await
        .unwrap();
    assert_eq!(library::index_status(&app).unwrap(), vec![("doc.txt".to_string(), 1)]);
}

#[test]
fn test_ask_rejects_paths_outside_library() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = open(dir.path(), Arc::new(LetterEmbedder::default()));
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let err = runtime
        .block_on(chat::ask_with(
            &mut app,
            &ScriptedChat::default(),
            "gpt-4o",
            &ask("q", &["../secret.txt"], false),
        ))
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
}
