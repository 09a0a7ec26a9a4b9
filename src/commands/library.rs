//! The uploaded document library: files, folders, tags and notes.
//!
//! Documents live under the upload directory either at the root (`name`)
//! or one folder deep (`folder/name`). That relative path is the key used
//! by the vector index, tags and notes alike, so every move or delete here
//! keeps the three in step.

use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{validate_document_path, validate_name, App};
use crate::cache::{self, is_cache_file, CacheKind, SidecarCache};
use crate::db::models::DocumentNote;
use crate::doc_processor::{self, SUPPORTED_EXTENSIONS};
use crate::error::AppError;

pub const PREVIEW_CHARS: usize = 2000;

#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub path: String,
    pub folder: Option<String>,
    pub size: u64,
    pub tags: Vec<String>,
    pub note: DocumentNote,
}

fn split_folder(path: &str) -> (Option<&str>, &str) {
    match path.split_once('/') {
        Some((folder, name)) => (Some(folder), name),
        None => (None, path),
    }
}

fn join_folder(folder: Option<&str>, name: &str) -> String {
    match folder {
        Some(folder) => format!("{}/{}", folder, name),
        None => name.to_string(),
    }
}

fn is_document(path: &Path) -> bool {
    path.is_file() && !is_cache_file(path)
}

/// Documents under `upload_dir`, root files and one folder level, sorted.
pub fn list_documents(upload_dir: &Path) -> io::Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(upload_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(String::from) else {
            continue;
        };
        if path.is_dir() {
            for inner in fs::read_dir(&path)? {
                let inner = inner?.path();
                if let Some(inner_name) = inner.file_name().and_then(|n| n.to_str()) {
                    if is_document(&inner) {
                        files.push(format!("{}/{}", name, inner_name));
                    }
                }
            }
        } else if is_document(&path) {
            files.push(name);
        }
    }
    files.sort();
    Ok(files)
}

pub fn available_files(app: &App) -> Result<Vec<String>, AppError> {
    Ok(list_documents(app.upload_dir())?)
}

pub fn list_folders(app: &App) -> Result<Vec<String>, AppError> {
    let mut folders = Vec::new();
    for entry in fs::read_dir(app.upload_dir())? {
        let path = entry?.path();
        if path.is_dir() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                folders.push(name.to_string());
            }
        }
    }
    folders.sort();
    Ok(folders)
}

fn documents_in(app: &App, folder: &str) -> Result<Vec<String>, AppError> {
    let prefix = format!("{}/", folder);
    Ok(available_files(app)?
        .into_iter()
        .filter(|f| f.starts_with(&prefix))
        .collect())
}

/// File name of an upload source, if it is a plain name with a supported
/// extension.
fn upload_name(source: &Path) -> Result<&str, AppError> {
    let name = source
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| AppError::InvalidInput(format!("no file name in {:?}", source)))?;
    validate_name(name)?;
    let extension = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(AppError::InvalidInput(format!(
            "{}: unsupported file type (expected one of {})",
            name,
            SUPPORTED_EXTENSIONS.join(", ")
        )));
    }
    Ok(name)
}

/// Copy files into the library root or into `folder` (created if needed).
/// Every source is checked before anything is copied. Re-uploading a name
/// overwrites it; its stale vectors are dropped, also when a later copy fails.
pub fn upload_documents(
    app: &mut App,
    sources: &[PathBuf],
    folder: Option<&str>,
) -> Result<Vec<String>, AppError> {
    if let Some(folder) = folder {
        validate_name(folder)?;
    }
    let names = sources
        .iter()
        .map(|source| upload_name(source))
        .collect::<Result<Vec<_>, _>>()?;

    let target_dir = match folder {
        Some(folder) => app.upload_dir().join(folder),
        None => app.upload_dir().to_path_buf(),
    };
    fs::create_dir_all(&target_dir)?;

    let mut saved = Vec::with_capacity(sources.len());
    let mut copied = Ok(());
    for (source, name) in sources.iter().zip(names) {
        if let Err(e) = fs::copy(source, target_dir.join(name)) {
            copied = Err(e);
            break;
        }
        saved.push(join_folder(folder, name));
    }

    app.engine_mut().forget_files(&saved)?;
    copied?;
    info!("uploaded {} file(s): {:?}", saved.len(), saved);
    Ok(saved)
}

/// Remove documents along with their caches, tags, notes and vectors. On a
/// failure, the files already removed are still forgotten.
pub fn delete_files(app: &mut App, files: &[String]) -> Result<(), AppError> {
    let mut removed = Vec::with_capacity(files.len());
    let mut outcome = Ok(());
    for file in files {
        let result = app.document_path(file).and_then(|path| {
            fs::remove_file(&path)?;
            removed.push(file.clone());
            Ok(cache::invalidate_all(&path)?)
        });
        if let Err(e) = result {
            outcome = Err(e);
            break;
        }
    }

    forget(app, &removed)?;
    outcome?;
    info!("deleted {:?}", files);
    Ok(())
}

fn forget(app: &mut App, files: &[String]) -> Result<(), AppError> {
    app.db.forget_documents(files)?;
    app.engine_mut().forget_files(files)
}

/// First characters of a text document; `None` when it is not UTF-8.
pub fn preview(app: &App, file: &str) -> Result<Option<String>, AppError> {
    let bytes = fs::read(app.document_path(file)?)?;
    Ok(String::from_utf8(bytes)
        .ok()
        .map(|text| text.chars().take(PREVIEW_CHARS).collect()))
}

/// Loader output for a document, memoized beside it.
pub fn extracted_text(app: &App, file: &str) -> Result<String, AppError> {
    let path = app.document_path(file)?;
    SidecarCache::new(CacheKind::Ocr)
        .get_or_insert_with(&path, || Ok(doc_processor::parse_file(&path)?.content()))
}

/// Every document with its tags and note, optionally limited to one
/// folder (`Some("")` selects the root).
pub fn document_details(app: &App, folder: Option<&str>) -> Result<Vec<DocumentInfo>, AppError> {
    let mut details = Vec::new();
    for path in available_files(app)? {
        let (doc_folder, _) = split_folder(&path);
        let wanted = match folder {
            None => true,
            Some("") => doc_folder.is_none(),
            Some(f) => doc_folder == Some(f),
        };
        if !wanted {
            continue;
        }
        let size = fs::metadata(app.upload_dir().join(&path))?.len();
        details.push(DocumentInfo {
            folder: doc_folder.map(String::from),
            size,
            tags: app.db.get_tags_for_file(&path)?,
            note: app.db.get_document_note(&path)?,
            path,
        });
    }
    Ok(details)
}

// ── Tags and notes ──

pub fn set_tags(app: &App, file: &str, tags: &[String]) -> Result<Vec<String>, AppError> {
    validate_document_path(file)?;
    app.db.save_tags_for_file(file, tags)?;
    Ok(app.db.get_tags_for_file(file)?)
}

pub fn set_note(app: &App, file: &str, note: &str, favorite: bool) -> Result<(), AppError> {
    validate_document_path(file)?;
    Ok(app.db.save_document_note(file, note, favorite)?)
}

/// Every tag with the documents carrying it.
pub fn files_by_tag(app: &App) -> Result<Vec<(String, Vec<String>)>, AppError> {
    app.db
        .get_all_tags()?
        .into_iter()
        .map(|tag| {
            let files = app.db.files_with_tag(&tag)?;
            Ok((tag, files))
        })
        .collect()
}

// ── Folders ──

pub fn create_folder(app: &App, name: &str) -> Result<(), AppError> {
    validate_name(name)?;
    fs::create_dir_all(app.upload_dir().join(name))?;
    info!("created folder {}", name);
    Ok(())
}

pub fn rename_folder(app: &mut App, old: &str, new: &str) -> Result<(), AppError> {
    validate_name(old)?;
    validate_name(new)?;
    let from = app.upload_dir().join(old);
    let to = app.upload_dir().join(new);
    if !from.is_dir() {
        return Err(AppError::NotFound(format!("folder {}", old)));
    }
    if to.exists() {
        return Err(AppError::InvalidInput(format!("{} already exists", new)));
    }

    let moved = documents_in(app, old)?;
    fs::rename(&from, &to)?;
    app.db
        .rename_document_refs(&format!("{}/", old), &format!("{}/", new))?;
    app.engine_mut().forget_files(&moved)?;
    info!("renamed folder {} to {}", old, new);
    Ok(())
}

/// Move a document into `to_folder` (`None` = library root). Returns its
/// new path.
pub fn move_file(app: &mut App, file: &str, to_folder: Option<&str>) -> Result<String, AppError> {
    let from = app.document_path(file)?;
    if !from.is_file() {
        return Err(AppError::NotFound(file.to_string()));
    }
    let (_, name) = split_folder(file);
    let target_dir = match to_folder {
        Some(folder) => {
            validate_name(folder)?;
            let dir = app.upload_dir().join(folder);
            if !dir.is_dir() {
                return Err(AppError::NotFound(format!("folder {}", folder)));
            }
            dir
        }
        None => app.upload_dir().to_path_buf(),
    };

    let destination = join_folder(to_folder, name);
    if destination == file {
        return Ok(destination);
    }
    let to = target_dir.join(name);
    if to.exists() {
        return Err(AppError::InvalidInput(format!("{} already exists", destination)));
    }

    fs::rename(&from, &to)?;
    for kind in [CacheKind::Summary, CacheKind::Ocr] {
        let sidecars = SidecarCache::new(kind);
        let old_sidecar = sidecars.sidecar_path(&from);
        if old_sidecar.exists() {
            fs::rename(old_sidecar, sidecars.sidecar_path(&to))?;
        }
    }
    app.db.rename_document_refs(file, &destination)?;
    app.engine_mut().forget_files(&[file.to_string()])?;
    info!("moved {} to {}", file, destination);
    Ok(destination)
}

/// Delete a folder. Without `recursive` only an empty folder is removed and
/// the filesystem error is returned otherwise.
pub fn delete_folder(app: &mut App, name: &str, recursive: bool) -> Result<(), AppError> {
    validate_name(name)?;
    let dir = app.upload_dir().join(name);
    if recursive {
        let documents = documents_in(app, name)?;
        fs::remove_dir_all(&dir)?;
        forget(app, &documents)?;
    } else {
        fs::remove_dir(&dir)?;
    }
    info!("deleted folder {}", name);
    Ok(())
}

// ── Index maintenance ──

/// Sources currently in the vector index with their chunk counts.
pub fn index_status(app: &App) -> Result<Vec<(String, usize)>, AppError> {
    Ok(app.engine().index().store().sources()?)
}

/// Drop every vector; the next question re-vectorizes its selection.
pub fn reindex(app: &mut App) -> Result<(), AppError> {
    app.engine_mut().reset_index()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::index::tests::LetterEmbedder;
    use std::sync::Arc;

    fn app(dir: &Path) -> App {
        App::with_embedder(AppConfig::rooted_at(dir), Arc::new(LetterEmbedder::default())).unwrap()
    }

    fn source(dir: &Path, name: &str, body: &str) -> PathBuf {
        let src = dir.join("incoming");
        fs::create_dir_all(&src).unwrap();
        let path = src.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_upload_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());

        let a = source(dir.path(), "a.txt", "alpha");
        let b = source(dir.path(), "b.csv", "h\n1");
        assert_eq!(upload_documents(&mut app, &[a], None).unwrap(), vec!["a.txt"]);
        assert_eq!(
            upload_documents(&mut app, &[b], Some("reports")).unwrap(),
            vec!["reports/b.csv"]
        );
        SidecarCache::new(CacheKind::Ocr)
            .put(&app.upload_dir().join("a.txt"), "alpha")
            .unwrap();

        assert_eq!(available_files(&app).unwrap(), vec!["a.txt", "reports/b.csv"]);
        assert_eq!(list_folders(&app).unwrap(), vec!["reports"]);

        let exe = source(dir.path(), "tool.exe", "MZ");
        assert!(matches!(
            upload_documents(&mut app, &[exe], None),
            Err(AppError::InvalidInput(_))
        ));
        assert!(upload_documents(&mut app, &[], Some("../escape")).is_err());
    }

    #[test]
    fn test_delete_forgets_tags_notes_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        let a = source(dir.path(), "a.txt", "alpha");
        upload_documents(&mut app, &[a], None).unwrap();
        set_tags(&app, "a.txt", &["x".into()]).unwrap();
        set_note(&app, "a.txt", "remember", true).unwrap();
        assert_eq!(extracted_text(&app, "a.txt").unwrap(), "alpha");

        delete_files(&mut app, &["a.txt".into()]).unwrap();
        assert!(available_files(&app).unwrap().is_empty());
        assert!(fs::read_dir(app.upload_dir()).unwrap().next().is_none());
        assert!(app.db.get_all_tags().unwrap().is_empty());
        assert_eq!(app.db.get_document_note("a.txt").unwrap(), DocumentNote::default());
        assert!(delete_files(&mut app, &["a.txt".into()]).is_err());
    }

    #[tokio::test]
    async fn test_rejected_upload_copies_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        let a = source(dir.path(), "a.txt", "old version");
        upload_documents(&mut app, &[a.clone()], None).unwrap();
        app.engine_mut().prepare(&["a.txt".to_string()]).await.unwrap();

        fs::write(&a, "new version").unwrap();
        let exe = source(dir.path(), "b.exe", "MZ");
        assert!(upload_documents(&mut app, &[a, exe], None).is_err());
        assert_eq!(fs::read_to_string(app.upload_dir().join("a.txt")).unwrap(), "old version");
        assert!(app.engine().session().is_indexed("a.txt"));
    }

    #[tokio::test]
    async fn test_failed_copy_still_drops_overwritten_vectors() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        let a = source(dir.path(), "a.txt", "old version");
        upload_documents(&mut app, &[a.clone()], None).unwrap();
        app.engine_mut().prepare(&["a.txt".to_string()]).await.unwrap();

        fs::write(&a, "new version").unwrap();
        let gone = dir.path().join("incoming").join("gone.txt");
        assert!(upload_documents(&mut app, &[a, gone], None).is_err());
        assert_eq!(fs::read_to_string(app.upload_dir().join("a.txt")).unwrap(), "new version");
        assert!(!app.engine().session().is_indexed("a.txt"));
        assert!(index_status(&app).unwrap().is_empty());
    }

    #[test]
    fn test_partial_delete_forgets_removed_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        let a = source(dir.path(), "a.txt", "alpha");
        upload_documents(&mut app, &[a], None).unwrap();
        set_tags(&app, "a.txt", &["t".into()]).unwrap();

        let err = delete_files(&mut app, &["a.txt".into(), "missing.txt".into()]);
        assert!(matches!(err, Err(AppError::Io(_))));
        assert!(!app.upload_dir().join("a.txt").exists());
        assert!(app.db.get_tags_for_file("a.txt").unwrap().is_empty());
    }

    #[test]
    fn test_preview_and_details() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        let long = "é".repeat(PREVIEW_CHARS + 10);
        let a = source(dir.path(), "long.txt", &long);
        upload_documents(&mut app, &[a], None).unwrap();
        fs::write(app.upload_dir().join("bin.pdf"), [0xff, 0xfe, 0x00]).unwrap();

        assert_eq!(preview(&app, "long.txt").unwrap().unwrap().chars().count(), PREVIEW_CHARS);
        assert_eq!(preview(&app, "bin.pdf").unwrap(), None);

        set_tags(&app, "long.txt", &["t".into()]).unwrap();
        let details = document_details(&app, Some("")).unwrap();
        assert_eq!(details.len(), 2);
        let long_doc = details.iter().find(|d| d.path == "long.txt").unwrap();
        assert_eq!(long_doc.tags, vec!["t"]);
        assert!(document_details(&app, Some("nowhere")).unwrap().is_empty());
        assert_eq!(files_by_tag(&app).unwrap(), vec![("t".to_string(), vec!["long.txt".to_string()])]);
    }

    #[test]
    fn test_folder_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        create_folder(&app, "inbox").unwrap();
        create_folder(&app, "archive").unwrap();
        assert!(create_folder(&app, "a/b").is_err());

        let a = source(dir.path(), "a.txt", "alpha");
        upload_documents(&mut app, &[a], Some("inbox")).unwrap();
        set_tags(&app, "inbox/a.txt", &["keep".into()]).unwrap();
        extracted_text(&app, "inbox/a.txt").unwrap();

        let moved = move_file(&mut app, "inbox/a.txt", Some("archive")).unwrap();
        assert_eq!(moved, "archive/a.txt");
        assert_eq!(app.db.files_with_tag("keep").unwrap(), vec!["archive/a.txt"]);
        assert!(SidecarCache::new(CacheKind::Ocr)
            .sidecar_path(&app.upload_dir().join("archive/a.txt"))
            .exists());
        assert!(matches!(
            move_file(&mut app, "archive/a.txt", Some("missing")),
            Err(AppError::NotFound(_))
        ));

        rename_folder(&mut app, "archive", "old").unwrap();
        assert_eq!(available_files(&app).unwrap(), vec!["old/a.txt"]);
        assert_eq!(app.db.files_with_tag("keep").unwrap(), vec!["old/a.txt"]);
        assert!(rename_folder(&mut app, "old", "inbox").is_err());

        assert!(delete_folder(&mut app, "old", false).is_err());
        delete_folder(&mut app, "inbox", false).unwrap();
        delete_folder(&mut app, "old", true).unwrap();
        assert!(available_files(&app).unwrap().is_empty());
        assert!(list_folders(&app).unwrap().is_empty());
        assert!(app.db.files_with_tag("keep").unwrap().is_empty());
    }

    #[test]
    fn test_move_back_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        let a = source(dir.path(), "a.txt", "alpha");
        upload_documents(&mut app, &[a], Some("f")).unwrap();
        assert_eq!(move_file(&mut app, "f/a.txt", None).unwrap(), "a.txt");
        assert_eq!(move_file(&mut app, "a.txt", None).unwrap(), "a.txt");
        assert_eq!(available_files(&app).unwrap(), vec!["a.txt"]);
    }
}
