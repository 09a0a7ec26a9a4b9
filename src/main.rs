use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use docchat::commands::{self, chat::AskInput, library, App};
use docchat::config::AppConfig;
use docchat::db::models::{LaiFilter, LaiRequest, NewLaiRequest};
use docchat::logging;
use docchat::view::{self, View, ViewOptions};
use std::io::Write;
use std::path::PathBuf;
use std::process;

/// Ask questions about your documents and keep track of LAI requests.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "DOCCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy documents into the library
    Upload {
        files: Vec<PathBuf>,
        /// Destination folder (created if missing)
        #[arg(short, long)]
        folder: Option<String>,
    },
    /// List documents in the library
    Files,
    /// Delete documents with their tags, notes and caches
    Delete { files: Vec<String> },
    /// Ask a question about selected documents
    Ask {
        question: String,
        /// Documents to search (default: all)
        #[arg(short, long = "file")]
        files: Vec<String>,
        /// Model, e.g. gpt-4o, claude/<id> or ollama/<id>
        #[arg(short, long)]
        model: Option<String>,
        /// Send neither the system instruction nor earlier turns
        #[arg(long)]
        ignore_history: bool,
    },
    /// Print the conversation history
    History,
    /// Delete the whole conversation history
    ClearHistory,
    /// Replace the tags of a document
    Tag {
        file: String,
        #[arg(value_delimiter = ',')]
        tags: Vec<String>,
    },
    /// Set the note and favorite flag of a document
    Note {
        file: String,
        note: String,
        #[arg(long)]
        favorite: bool,
    },
    /// Full-text search across the library
    Search { term: String },
    /// Manage folders
    #[command(subcommand)]
    Folder(FolderCommand),
    /// Access-to-information requests
    #[command(subcommand)]
    Lai(LaiCommand),
    /// Render a page
    View {
        page: View,
        #[arg(long)]
        folder: Option<String>,
        #[arg(long)]
        term: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        recipient: Option<String>,
        #[arg(long, default_value_t = 1)]
        page_number: usize,
    },
    /// Drop all vectors so documents are re-read on the next question
    Reindex,
    /// Show models and effective settings
    Models,
}

#[derive(Subcommand, Debug)]
enum FolderCommand {
    Create { name: String },
    Rename { old: String, new: String },
    /// Move a document (`name` or `folder/name`) into a folder, or to the root
    Move {
        file: String,
        #[arg(long)]
        to: Option<String>,
    },
    Delete {
        name: String,
        /// Also delete the documents inside
        #[arg(long)]
        recursive: bool,
    },
}

#[derive(Subcommand, Debug)]
enum LaiCommand {
    /// Register a request; the deadline is computed
    Add {
        question: String,
        #[arg(long, default_value = "")]
        recipient: String,
        #[arg(long, default_value = "")]
        origin: String,
        /// Submission date (YYYY-MM-DD), default today
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        active_transparency: bool,
        #[arg(long, default_value = "")]
        note: String,
        #[arg(long, default_value = "")]
        appeal_body_1: String,
        #[arg(long, default_value = "")]
        appeal_site_1: String,
        #[arg(long, default_value = "")]
        appeal_text_1: String,
        #[arg(long, default_value = "")]
        appeal_body_2: String,
        #[arg(long, default_value = "")]
        appeal_site_2: String,
        #[arg(long, default_value = "")]
        appeal_text_2: String,
    },
    List {
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        recipient: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    Show { id: i64 },
    Edit {
        id: i64,
        #[arg(long)]
        question: Option<String>,
        /// New tag; an empty string clears it
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        note: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(&args.log_level);

    let config = AppConfig::load(args.config.as_deref())?;
    let mut app = App::open(config)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match args.command {
        Commands::Upload { files, folder } => {
            for saved in library::upload_documents(&mut app, &files, folder.as_deref())? {
                writeln!(out, "uploaded {}", saved)?;
            }
        }
        Commands::Files => {
            for file in library::available_files(&app)? {
                writeln!(out, "{}", file)?;
            }
        }
        Commands::Delete { files } => {
            library::delete_files(&mut app, &files)?;
            writeln!(out, "deleted {} file(s)", files.len())?;
        }
        Commands::Ask {
            question,
            files,
            model,
            ignore_history,
        } => {
            let files = if files.is_empty() {
                library::available_files(&app)?
            } else {
                files
            };
            let input = AskInput {
                question,
                files,
                model,
                ignore_history,
            };
            let turn = commands::chat::ask(&mut app, &input).await?;
            writeln!(out, "{}", turn.answer)?;
            if let Some(sources) = turn.sources {
                writeln!(out, "\nSources: {}", sources)?;
            }
        }
        Commands::History => view::render(View::Chat, &app, &ViewOptions::default(), &mut out)?,
        Commands::ClearHistory => {
            commands::chat::clear_history(&app)?;
            writeln!(out, "history cleared")?;
        }
        Commands::Tag { file, tags } => {
            let saved = library::set_tags(&app, &file, &tags)?;
            writeln!(out, "{}: {}", file, saved.join(", "))?;
        }
        Commands::Note {
            file,
            note,
            favorite,
        } => {
            library::set_note(&app, &file, &note, favorite)?;
            writeln!(out, "note saved for {}", file)?;
        }
        Commands::Search { term } => {
            let options = ViewOptions {
                term: Some(term),
                ..ViewOptions::default()
            };
            view::render(View::Search, &app, &options, &mut out)?;
        }
        Commands::Folder(command) => run_folder(&mut app, command, &mut out)?,
        Commands::Lai(command) => run_lai(&app, command, &mut out)?,
        Commands::View {
            page,
            folder,
            term,
            tag,
            recipient,
            page_number,
        } => {
            let options = ViewOptions {
                folder,
                term,
                lai_filter: LaiFilter { tag, recipient },
                page: page_number,
            };
            view::render(page, &app, &options, &mut out)?;
        }
        Commands::Reindex => {
            library::reindex(&mut app)?;
            writeln!(out, "vector index cleared")?;
        }
        Commands::Models => {
            for model in commands::settings::available_models(&app.config) {
                writeln!(out, "{:<40} {} ({})", model.id, model.name, model.provider)?;
            }
            writeln!(out)?;
            for (key, value) in commands::settings::describe(&app.config) {
                writeln!(out, "{:<16} {}", key, value)?;
            }
            for (source, chunks) in library::index_status(&app)? {
                writeln!(out, "indexed {:<40} {} chunk(s)", source, chunks)?;
            }
        }
    }
    Ok(())
}

fn run_folder(app: &mut App, command: FolderCommand, out: &mut impl Write) -> anyhow::Result<()> {
    match command {
        FolderCommand::Create { name } => {
            library::create_folder(app, &name)?;
            writeln!(out, "created {}", name)?;
        }
        FolderCommand::Rename { old, new } => {
            library::rename_folder(app, &old, &new)?;
            writeln!(out, "renamed {} to {}", old, new)?;
        }
        FolderCommand::Move { file, to } => {
            let moved = library::move_file(app, &file, to.as_deref())?;
            writeln!(out, "moved {} to {}", file, moved)?;
        }
        FolderCommand::Delete { name, recursive } => {
            library::delete_folder(app, &name, recursive)?;
            writeln!(out, "deleted {}", name)?;
        }
    }
    Ok(())
}

fn print_request(out: &mut impl Write, request: &LaiRequest) -> std::io::Result<()> {
    writeln!(out, "#{} {}", request.id, request.question)?;
    writeln!(out, "  recipient: {}", request.recipient)?;
    writeln!(
        out,
        "  submitted {} / due {}",
        request.submitted_on, request.response_deadline
    )?;
    if let Some(tag) = &request.tag {
        writeln!(out, "  tag: {}", tag)?;
    }
    if !request.private_note.is_empty() {
        writeln!(out, "  note: {}", request.private_note)?;
    }
    Ok(())
}

fn run_lai(app: &App, command: LaiCommand, out: &mut impl Write) -> anyhow::Result<()> {
    use commands::lai;

    match command {
        LaiCommand::Add {
            question,
            recipient,
            origin,
            date,
            tag,
            active_transparency,
            note,
            appeal_body_1,
            appeal_site_1,
            appeal_text_1,
            appeal_body_2,
            appeal_site_2,
            appeal_text_2,
        } => {
            let saved = lai::register(
                app,
                &NewLaiRequest {
                    question,
                    submitted_on: date,
                    origin,
                    recipient,
                    appeal_body_1,
                    appeal_site_1,
                    appeal_text_1,
                    appeal_body_2,
                    appeal_site_2,
                    appeal_text_2,
                    tag,
                    active_transparency,
                    private_note: note,
                },
            )?;
            print_request(out, &saved)?;
        }
        LaiCommand::List {
            tag,
            recipient,
            page,
        } => {
            let listing = lai::list(app, &LaiFilter { tag, recipient }, page)?;
            writeln!(
                out,
                "page {}/{} ({} total)",
                listing.page, listing.total_pages, listing.total
            )?;
            for request in &listing.requests {
                print_request(out, request)?;
            }
        }
        LaiCommand::Show { id } => {
            let detail = lai::detail(app, id)?;
            print_request(out, &detail.request)?;
            for (related_id, question) in &detail.related_requests {
                writeln!(out, "  related #{}: {}", related_id, question)?;
            }
            for file in &detail.related_documents {
                writeln!(out, "  document: {}", file)?;
            }
        }
        LaiCommand::Edit {
            id,
            question,
            tag,
            note,
        } => {
            let current = lai::detail(app, id)?.request;
            let updated = lai::edit(
                app,
                id,
                question.as_deref().unwrap_or(&current.question),
                match tag.as_deref() {
                    Some(tag) => Some(tag),
                    None => current.tag.as_deref(),
                },
                note.as_deref().unwrap_or(&current.private_note),
            )?;
            print_request(out, &updated)?;
        }
    }
    Ok(())
}
