use crate::config::AppConfig;
use crate::llm::ModelInfo;

fn model(id: &str, name: &str, provider: &str) -> ModelInfo {
    ModelInfo {
        id: id.into(),
        name: name.into(),
        provider: provider.into(),
    }
}

/// Models selectable in the chat page. Hosted providers only appear once
/// their API key is configured; Ollama is local and always listed.
pub fn available_models(config: &AppConfig) -> Vec<ModelInfo> {
    let mut models = Vec::new();

    if config.openai.api_key.is_some() {
        models.extend([
            model("gpt-3.5-turbo", "GPT-3.5 Turbo", "OpenAI"),
            model("gpt-4", "GPT-4", "OpenAI"),
            model("gpt-4-turbo", "GPT-4 Turbo", "OpenAI"),
            model("gpt-4o", "GPT-4o", "OpenAI"),
        ]);
    }

    if config.claude.api_key.is_some() {
        models.extend([
            model("claude/claude-sonnet-4-20250514", "Claude Sonnet 4", "Anthropic"),
            model("claude/claude-3-5-haiku-20241022", "Claude Haiku 3.5", "Anthropic"),
        ]);
    }

    models.extend([
        model("ollama/llama3", "Llama 3", "Ollama"),
        model("ollama/qwen2.5", "Qwen 2.5", "Ollama"),
    ]);
    models
}

/// Effective settings for display, API keys masked.
pub fn describe(config: &AppConfig) -> Vec<(String, String)> {
    vec![
        ("upload_dir".into(), config.upload_dir.display().to_string()),
        ("index_dir".into(), config.index_dir.display().to_string()),
        ("db_path".into(), config.db_path.display().to_string()),
        ("default_model".into(), config.default_model.clone()),
        ("embedding_model".into(), config.embedding_model.clone()),
        (
            "chunking".into(),
            format!("{} / {} overlap", config.chunk_size, config.chunk_overlap),
        ),
        ("top_k".into(), config.top_k.to_string()),
        ("openai_api_key".into(), mask_key(config.openai.api_key.as_deref())),
        ("claude_api_key".into(), mask_key(config.claude.api_key.as_deref())),
        ("ollama_host".into(), config.ollama_host.clone()),
    ]
}

pub fn mask_key(key: Option<&str>) -> String {
    match key {
        None => "(not set)".into(),
        Some(value) if value.len() > 8 && value.is_ascii() => {
            format!("{}...{}", &value[..4], &value[value.len() - 4..])
        }
        Some(_) => "****".into(),
    }
}
