use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::error::LoadError;

/// Extensions with a dedicated parser. Anything else goes to the generic extractor.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "docx", "pptx", "csv", "txt"];

/// A run of text plus the page, slide, paragraph or row it came from (1-based).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub page: usize,
}

/// Parsed document content
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub segments: Vec<Segment>,
    pub file_type: String,
}

impl ParsedDocument {
    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|s| s.text.trim().is_empty())
    }

    /// All segments joined with newlines.
    pub fn content(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A window of document text ready for embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub source: String,
    pub page: usize,
    pub chunk_index: usize,
    pub content: String,
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Parse a document file into page-tagged text segments.
///
/// Unknown extensions and format-specific failures fall through to
/// [`parse_generic`]; only its errors reach the caller.
pub fn parse_file(path: &Path) -> Result<ParsedDocument, LoadError> {
    let ext = extension_of(path);

    let parsed = match ext.as_str() {
        "pdf" => parse_pdf(path),
        "docx" => parse_docx(path),
        "pptx" => parse_pptx(path),
        "csv" => parse_csv(path),
        "txt" => parse_txt(path),
        _ => {
            debug!("No dedicated parser for {:?}, using generic extractor", path);
            return parse_generic(path);
        }
    };

    match parsed {
        Ok(segments) => Ok(ParsedDocument {
            segments,
            file_type: ext,
        }),
        Err(e) => {
            warn!("{:?}: {}; falling back to generic extractor", path, e);
            parse_generic(path)
        }
    }
}

fn parse_txt(path: &Path) -> Result<Vec<Segment>, LoadError> {
    let content = fs::read_to_string(path)?;
    Ok(single_segment(content))
}

fn single_segment(content: String) -> Vec<Segment> {
    if content.trim().is_empty() {
        vec![]
    } else {
        vec![Segment {
            text: content,
            page: 1,
        }]
    }
}

fn parse_pdf(path: &Path) -> Result<Vec<Segment>, LoadError> {
    let bytes = fs::read(path)?;
    // pdf-extract panics on some malformed inputs
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(&bytes))
        .map_err(|_| LoadError::Parse {
            format: "PDF",
            message: "parser panicked".into(),
        })?
        .map_err(|e| LoadError::Parse {
            format: "PDF",
            message: e.to_string(),
        })?;

    Ok(pages
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| Segment {
            text: text.trim().to_string(),
            page: i + 1,
        })
        .collect())
}

fn zip_error(format: &'static str) -> impl Fn(zip::result::ZipError) -> LoadError {
    move |e| LoadError::Parse {
        format,
        message: e.to_string(),
    }
}

fn read_zip_entry<R: Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
    format: &'static str,
) -> Result<String, LoadError> {
    let mut entry = archive.by_name(name).map_err(zip_error(format))?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;
    Ok(xml)
}

fn docx_paragraph_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<w:p[ >].*?</w:p>").expect("valid regex"))
}

fn docx_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>|<w:(tab|br|cr)\b[^>]*/>").expect("valid regex")
    })
}

fn pptx_text_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<a:t(?:\s[^>]*)?>(.*?)</a:t>").expect("valid regex"))
}

fn pptx_slide_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^ppt/slides/slide(\d+)\.xml$").expect("valid regex"))
}

fn entity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"&(#x[0-9a-fA-F]+|#[0-9]+|lt|gt|quot|apos|amp);").expect("valid regex"))
}

/// Decode the predefined XML entities and numeric character references.
pub fn decode_xml_entities(text: &str) -> String {
    entity_re()
        .replace_all(text, |caps: &regex::Captures| {
            let name = &caps[1];
            let decoded = match name {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "amp" => Some('&'),
                _ => {
                    let code = if let Some(hex) = name.strip_prefix("#x") {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        name[1..].parse::<u32>().ok()
                    };
                    code.and_then(char::from_u32)
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), |c| c.to_string())
        })
        .into_owned()
}

fn parse_docx(path: &Path) -> Result<Vec<Segment>, LoadError> {
    let file = fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(zip_error("DOCX"))?;
    let xml = read_zip_entry(&mut archive, "word/document.xml", "DOCX")?;
    Ok(docx_segments(&xml))
}

/// One segment per non-empty `<w:p>` paragraph.
pub fn docx_segments(xml: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    for paragraph in docx_paragraph_re().find_iter(xml) {
        let mut text = String::new();
        for caps in docx_run_re().captures_iter(paragraph.as_str()) {
            if let Some(run) = caps.get(1) {
                text.push_str(&decode_xml_entities(run.as_str()));
            } else if let Some(tag) = caps.get(2) {
                text.push(if tag.as_str() == "tab" { '\t' } else { '\n' });
            }
        }
        if !text.trim().is_empty() {
            segments.push(Segment {
                text: text.trim().to_string(),
                page: segments.len() + 1,
            });
        }
    }
    segments
}

fn parse_pptx(path: &Path) -> Result<Vec<Segment>, LoadError> {
    let file = fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(zip_error("PPTX"))?;

    let mut slides: Vec<(usize, String)> = archive
        .file_names()
        .filter_map(|name| {
            pptx_slide_re()
                .captures(name)
                .and_then(|caps| caps[1].parse::<usize>().ok())
                .map(|n| (n, name.to_string()))
        })
        .collect();
    if slides.is_empty() {
        return Err(LoadError::Parse {
            format: "PPTX",
            message: "archive has no slides".into(),
        });
    }
    slides.sort_by_key(|(n, _)| *n);

    let mut segments = Vec::new();
    for (number, name) in slides {
        let xml = read_zip_entry(&mut archive, &name, "PPTX")?;
        let text = slide_text(&xml);
        if !text.is_empty() {
            segments.push(Segment { text, page: number });
        }
    }
    Ok(segments)
}

/// Text runs of one slide, one per line.
pub fn slide_text(xml: &str) -> String {
    pptx_text_re()
        .captures_iter(xml)
        .map(|caps| decode_xml_entities(&caps[1]))
        .filter(|t| !t.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_csv(path: &Path) -> Result<Vec<Segment>, LoadError> {
    let content = fs::read_to_string(path)?;
    csv_segments(&content)
}

fn csv_error(e: csv::Error) -> LoadError {
    LoadError::Parse {
        format: "CSV",
        message: e.to_string(),
    }
}

/// One segment per data row, rendered as `header: value` lines. A file with
/// only a header row becomes a single segment.
pub fn csv_segments(content: &str) -> Result<Vec<Segment>, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader.headers().map_err(csv_error)?.clone();
    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(csv_error)?;
        if record.iter().any(|field| !field.trim().is_empty()) {
            rows.push(record);
        }
    }

    if rows.is_empty() {
        let header_line = headers
            .iter()
            .map(str::trim)
            .collect::<Vec<_>>()
            .join(", ");
        return Ok(single_segment(header_line));
    }

    Ok(rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let text = row
                .iter()
                .enumerate()
                .map(|(col, value)| match headers.get(col) {
                    Some(name) if !name.trim().is_empty() => {
                        format!("{}: {}", name.trim(), value.trim())
                    }
                    _ => value.trim().to_string(),
                })
                .collect::<Vec<_>>()
                .join("\n");
            Segment { text, page: i + 1 }
        })
        .collect())
}

/// Best-effort extraction for anything the dedicated parsers could not read:
/// UTF-8 text as-is, otherwise printable runs of at least four characters.
pub fn parse_generic(path: &Path) -> Result<ParsedDocument, LoadError> {
    let bytes = fs::read(path)?;
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => printable_runs(&String::from_utf8_lossy(e.as_bytes()), 4),
    };

    let segments = single_segment(text);
    if segments.is_empty() {
        return Err(LoadError::NoText(path.display().to_string()));
    }
    Ok(ParsedDocument {
        segments,
        file_type: extension_of(path),
    })
}

fn printable_runs(text: &str, min_len: usize) -> String {
    let mut runs = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if c == char::REPLACEMENT_CHARACTER || (c.is_control() && c != ' ') {
            if current.trim().chars().count() >= min_len {
                runs.push(current.trim().to_string());
            }
            current.clear();
        } else {
            current.push(c);
        }
    }
    if current.trim().chars().count() >= min_len {
        runs.push(current.trim().to_string());
    }
    runs.join("\n")
}

/// Char-offset windows over `text`: `(start, window)`. Whitespace-only
/// windows are skipped.
fn windows(text: &str, chunk_size: usize, overlap: usize) -> Vec<(usize, String)> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![];
    }
    if chars.len() <= chunk_size {
        let chunk = text.trim();
        return if chunk.is_empty() {
            vec![]
        } else {
            vec![(0, chunk.to_string())]
        };
    }

    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut out = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim().to_string();
        if !chunk.is_empty() {
            out.push((start, chunk));
        }
        if end >= chars.len() {
            break;
        }
        start += step;
    }

    out
}

/// Split text into overlapping chunks for embedding
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    windows(text.trim(), chunk_size, overlap)
        .into_iter()
        .map(|(_, chunk)| chunk)
        .collect()
}

/// Chunk one document. Segments are joined so windows may span pages; each
/// chunk records the page its first character came from.
pub fn chunk_segments(
    source: &str,
    segments: &[Segment],
    chunk_size: usize,
    overlap: usize,
) -> Vec<Chunk> {
    let mut joined = String::new();
    let mut boundaries: Vec<(usize, usize)> = Vec::with_capacity(segments.len());
    let mut offset = 0;

    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            joined.push('\n');
            offset += 1;
        }
        boundaries.push((offset, segment.page));
        joined.push_str(&segment.text);
        offset += segment.text.chars().count();
    }

    windows(&joined, chunk_size, overlap)
        .into_iter()
        .enumerate()
        .map(|(chunk_index, (start, content))| {
            let page = boundaries
                .iter()
                .take_while(|(seg_start, _)| *seg_start <= start)
                .last()
                .map(|(_, page)| *page)
                .unwrap_or(1);
            Chunk {
                source: source.to_string(),
                page,
                chunk_index,
                content,
            }
        })
        .collect()
}
