//! Text rendering of each page. Renderers only format what the command
//! functions return.

use chrono::Local;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::commands::{analytics, chat, lai, library, search, settings, App};
use crate::db::models::LaiFilter;
use crate::error::AppError;
use crate::lai::response_deadline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum View {
    Chat,
    Dashboard,
    Tags,
    Folders,
    Analytics,
    Search,
    LaiRequests,
    LaiRegister,
}

/// Page parameters that some views take.
#[derive(Debug, Clone, Default)]
pub struct ViewOptions {
    /// Dashboard folder filter; `Some("")` is the library root.
    pub folder: Option<String>,
    pub term: Option<String>,
    pub lai_filter: LaiFilter,
    pub page: usize,
}

pub fn render(
    view: View,
    app: &App,
    options: &ViewOptions,
    out: &mut dyn Write,
) -> Result<(), AppError> {
    match view {
        View::Chat => render_chat(app, out),
        View::Dashboard => render_dashboard(app, options.folder.as_deref(), out),
        View::Tags => render_tags(app, out),
        View::Folders => render_folders(app, out),
        View::Analytics => render_analytics(app, out),
        View::Search => render_search(app, options.term.as_deref(), out),
        View::LaiRequests => render_lai_requests(app, &options.lai_filter, options.page, out),
        View::LaiRegister => render_lai_register(app, out),
    }
}

fn heading(out: &mut dyn Write, title: &str) -> std::io::Result<()> {
    writeln!(out, "{}", title)?;
    writeln!(out, "{}", "=".repeat(title.chars().count()))
}

fn render_chat(app: &App, out: &mut dyn Write) -> Result<(), AppError> {
    heading(out, "Chat")?;
    let models: Vec<String> = settings::available_models(&app.config)
        .into_iter()
        .map(|m| m.id)
        .collect();
    writeln!(out, "Models: {}", models.join(", "))?;
    writeln!(out, "Default: {}", app.config.default_model)?;
    writeln!(out)?;

    let turns = chat::history(app)?;
    if turns.is_empty() {
        writeln!(out, "No conversation yet.")?;
    }
    for turn in turns {
        writeln!(out, "#{} [{}] {}", turn.id, turn.model, turn.created_at)?;
        writeln!(out, "Q: {}", turn.question)?;
        writeln!(out, "A: {}", turn.answer)?;
        if let Some(sources) = turn.sources.as_deref() {
            writeln!(out, "Sources: {}", sources)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn render_dashboard(app: &App, folder: Option<&str>, out: &mut dyn Write) -> Result<(), AppError> {
    heading(out, "Dashboard")?;
    let documents = library::document_details(app, folder)?;
    if documents.is_empty() {
        writeln!(out, "No documents.")?;
    }
    for doc in documents {
        let star = if doc.note.favorite { "*" } else { " " };
        writeln!(out, "{} {} ({} bytes)", star, doc.path, doc.size)?;
        if !doc.tags.is_empty() {
            writeln!(out, "    tags: {}", doc.tags.join(", "))?;
        }
        if !doc.note.note.is_empty() {
            writeln!(out, "    note: {}", doc.note.note)?;
        }
        match library::extracted_text(app, &doc.path) {
            Ok(text) => {
                let excerpt = search::summarize(&text);
                let excerpt: String = excerpt.chars().take(200).collect();
                writeln!(out, "    text: {}", excerpt)?;
            }
            Err(e) => writeln!(out, "    text: unavailable ({})", e)?,
        }
    }
    Ok(())
}

fn render_tags(app: &App, out: &mut dyn Write) -> Result<(), AppError> {
    heading(out, "Tags")?;
    let tagged = library::files_by_tag(app)?;
    if tagged.is_empty() {
        writeln!(out, "No tags yet.")?;
    }
    for (tag, files) in tagged {
        writeln!(out, "[{}]", tag)?;
        for file in files {
            writeln!(out, "  - {}", file)?;
        }
    }
    Ok(())
}

fn render_folders(app: &App, out: &mut dyn Write) -> Result<(), AppError> {
    heading(out, "Folders")?;
    let files = library::available_files(app)?;
    let root: Vec<&String> = files.iter().filter(|f| !f.contains('/')).collect();
    writeln!(out, "(root) {} file(s)", root.len())?;
    for file in root {
        writeln!(out, "  - {}", file)?;
    }
    for folder in library::list_folders(app)? {
        let prefix = format!("{}/", folder);
        let inside: Vec<&str> = files
            .iter()
            .filter_map(|f| f.strip_prefix(prefix.as_str()))
            .collect();
        writeln!(out, "{}/ {} file(s)", folder, inside.len())?;
        for name in inside {
            writeln!(out, "  - {}", name)?;
        }
    }
    Ok(())
}

fn render_analytics(app: &App, out: &mut dyn Write) -> Result<(), AppError> {
    heading(out, "Analytics")?;
    let stats = analytics::collect(app)?;
    writeln!(out, "Documents: {}", stats.total_documents)?;
    writeln!(out)?;
    writeln!(out, "Tag usage:")?;
    for (tag, n) in &stats.tag_counts {
        writeln!(out, "  {:<24} {}", tag, n)?;
    }
    writeln!(out)?;
    writeln!(out, "Questions per model:")?;
    for (model, n) in &stats.model_usage {
        writeln!(out, "  {:<24} {}", model, n)?;
    }
    Ok(())
}

fn render_search(app: &App, term: Option<&str>, out: &mut dyn Write) -> Result<(), AppError> {
    heading(out, "Search")?;
    let Some(term) = term.filter(|t| !t.trim().is_empty()) else {
        writeln!(out, "Enter a term to search the library.")?;
        return Ok(());
    };

    let results = search::search_documents(app, term)?;
    if results.hits.is_empty() {
        writeln!(out, "No document mentions {:?}.", term)?;
    }
    for hit in &results.hits {
        writeln!(out, "{}", hit.file)?;
        for line in &hit.snippets {
            writeln!(out, "  > {}", line)?;
        }
        writeln!(out, "  summary: {}", hit.summary)?;
    }
    for (file, reason) in &results.failures {
        writeln!(out, "! {}: {}", file, reason)?;
    }
    Ok(())
}

fn render_lai_requests(
    app: &App,
    filter: &LaiFilter,
    page: usize,
    out: &mut dyn Write,
) -> Result<(), AppError> {
    heading(out, "LAI requests")?;
    let listing = lai::list(app, filter, page)?;
    writeln!(
        out,
        "Page {}/{} ({} request(s))",
        listing.page, listing.total_pages, listing.total
    )?;
    for request in &listing.requests {
        writeln!(
            out,
            "#{} {} -> {} due {} [{}]",
            request.id,
            request.submitted_on,
            request.recipient,
            request.response_deadline,
            request.tag.as_deref().unwrap_or("-")
        )?;
        writeln!(out, "    {}", request.question)?;
        let detail = lai::detail(app, request.id)?;
        for (id, question) in &detail.related_requests {
            writeln!(out, "    related #{}: {}", id, question)?;
        }
        for file in &detail.related_documents {
            writeln!(out, "    document: {}", file)?;
        }
    }
    Ok(())
}

fn render_lai_register(app: &App, out: &mut dyn Write) -> Result<(), AppError> {
    heading(out, "Register LAI request")?;
    let today = Local::now().date_naive();
    writeln!(
        out,
        "Submitted today ({}), the answer is due {}.",
        today,
        response_deadline(today)
    )?;
    let recipients = app.db.lai_recipients()?;
    if !recipients.is_empty() {
        writeln!(out, "Known recipients: {}", recipients.join(", "))?;
    }
    let tags = app.db.lai_tags()?;
    if !tags.is_empty() {
        writeln!(out, "Known tags: {}", tags.join(", "))?;
    }
    writeln!(out, "Use `lai add` to register a new request.")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::models::NewLaiRequest;
    use crate::index::tests::LetterEmbedder;
    use std::sync::Arc;

    fn rendered(view: View, app: &App, options: &ViewOptions) -> String {
        let mut out = Vec::new();
        render(view, app, options, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_every_view_renders_on_empty_library() {
        let dir = tempfile::tempdir().unwrap();
        let app =
            App::with_embedder(AppConfig::rooted_at(dir.path()), Arc::new(LetterEmbedder::default()))
                .unwrap();
        for view in View::value_variants() {
            let text = rendered(*view, &app, &ViewOptions::default());
            assert!(!text.is_empty(), "{view:?} rendered nothing");
        }
    }

    #[test]
    fn test_views_show_library_state() {
        let dir = tempfile::tempdir().unwrap();
        let app =
            App::with_embedder(AppConfig::rooted_at(dir.path()), Arc::new(LetterEmbedder::default()))
                .unwrap();
        std::fs::create_dir_all(app.upload_dir().join("reports")).unwrap();
        std::fs::write(app.upload_dir().join("reports/r.txt"), "Quarterly budget").unwrap();
        app.db.save_tags_for_file("reports/r.txt", &["finance".into()]).unwrap();
        app.db
            .insert_lai_request(&NewLaiRequest {
                question: "Budget details?".into(),
                recipient: "SEFAZ".into(),
                tag: Some("finance".into()),
                ..NewLaiRequest::default()
            })
            .unwrap();

        let folders = rendered(View::Folders, &app, &ViewOptions::default());
        assert!(folders.contains("reports/ 1 file(s)"));

        let tags = rendered(View::Tags, &app, &ViewOptions::default());
        assert!(tags.contains("[finance]\n  - reports/r.txt"));

        let search = ViewOptions {
            term: Some("budget".into()),
            ..ViewOptions::default()
        };
        assert!(rendered(View::Search, &app, &search).contains("  > Quarterly budget"));

        let lai = rendered(View::LaiRequests, &app, &ViewOptions::default());
        assert!(lai.contains("Page 1/1 (1 request(s))"));
        assert!(lai.contains("document: reports/r.txt"));

        let dashboard = ViewOptions {
            folder: Some("reports".into()),
            ..ViewOptions::default()
        };
        assert!(rendered(View::Dashboard, &app, &dashboard).contains("tags: finance"));
    }
}
