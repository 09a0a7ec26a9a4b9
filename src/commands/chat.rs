use serde::{Deserialize, Serialize};
use tracing::info;

use super::App;
use crate::db::models::ConversationTurn;
use crate::error::AppError;
use crate::llm::{ChatModel, Provider};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskInput {
    pub question: String,
    /// Document paths (`name` or `folder/name`) the answer may draw on.
    pub files: Vec<String>,
    /// Model string such as "gpt-4o" or "claude/..."; the configured
    /// default when absent.
    pub model: Option<String>,
    #[serde(default)]
    pub ignore_history: bool,
}

/// Answer a question with the provider named by the model string and save
/// the turn.
pub async fn ask(app: &mut App, input: &AskInput) -> Result<ConversationTurn, AppError> {
    let model = input
        .model
        .clone()
        .unwrap_or_else(|| app.config.default_model.clone());
    let (provider, model_id) = Provider::resolve(&model, &app.config)?;
    ask_with(app, &provider, &model_id, input).await
}

/// Like [`ask`], with an explicit chat backend. Nothing is saved when
/// answering fails.
pub async fn ask_with(
    app: &mut App,
    chat: &dyn ChatModel,
    model: &str,
    input: &AskInput,
) -> Result<ConversationTurn, AppError> {
    let question = input.question.trim();
    if question.is_empty() {
        return Err(AppError::InvalidInput("question is empty".into()));
    }
    for file in &input.files {
        super::validate_document_path(file)?;
    }

    let history = if input.ignore_history {
        Vec::new()
    } else {
        app.db.recent_turns(app.config.history_window)?
    };

    let answer = app
        .engine_mut()
        .answer(chat, model, &input.files, question, input.ignore_history, &history)
        .await?;

    let turn = app
        .db
        .save_turn(model, question, &answer.text, answer.sources_opt())?;
    info!("turn #{} answered by {} from [{}]", turn.id, model, answer.sources);
    Ok(turn)
}

/// Full history, oldest first.
pub fn history(app: &App) -> Result<Vec<ConversationTurn>, AppError> {
    Ok(app.db.load_history()?)
}

pub fn clear_history(app: &App) -> Result<(), AppError> {
    app.db.delete_all_history()?;
    info!("conversation history cleared");
    Ok(())
}
