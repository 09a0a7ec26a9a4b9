//! Sidecar memoization next to each document (`<doc>.summary.cache`,
//! `<doc>.ocr.cache`).
//!
//! Entries are keyed by the SHA-256 of the document bytes; a sidecar whose
//! hash no longer matches the document is evicted on read.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const CACHE_SUFFIX: &str = ".cache";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Summary,
    Ocr,
}

impl CacheKind {
    fn suffix(self) -> &'static str {
        match self {
            CacheKind::Summary => ".summary.cache",
            CacheKind::Ocr => ".ocr.cache",
        }
    }
}

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    content_hash: String,
    value: String,
}

pub fn is_cache_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(CACHE_SUFFIX))
}

pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Read-through cache stored beside the document it describes.
#[derive(Debug, Clone, Copy)]
pub struct SidecarCache {
    kind: CacheKind,
}

impl SidecarCache {
    pub fn new(kind: CacheKind) -> Self {
        Self { kind }
    }

    pub fn sidecar_path(&self, document: &Path) -> PathBuf {
        let mut name = document.as_os_str().to_os_string();
        name.push(self.kind.suffix());
        PathBuf::from(name)
    }

    /// Cached value for `document`, if present and still matching its content.
    pub fn get(&self, document: &Path) -> io::Result<Option<String>> {
        let sidecar = self.sidecar_path(document);
        let raw = match fs::read_to_string(&sidecar) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let current = content_hash(&fs::read(document)?);
        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) if entry.content_hash == current => {
                debug!("cache hit: {:?}", sidecar);
                Ok(Some(entry.value))
            }
            Ok(_) => {
                warn!("{:?} changed since it was cached, evicting {:?}", document, sidecar);
                fs::remove_file(&sidecar)?;
                Ok(None)
            }
            Err(e) => {
                warn!("unreadable cache {:?} ({}), evicting", sidecar, e);
                fs::remove_file(&sidecar)?;
                Ok(None)
            }
        }
    }

    pub fn put(&self, document: &Path, value: &str) -> io::Result<()> {
        let entry = CacheEntry {
            content_hash: content_hash(&fs::read(document)?),
            value: value.to_string(),
        };
        let json = serde_json::to_string(&entry).map_err(io::Error::other)?;
        fs::write(self.sidecar_path(document), json)
    }

    /// Cached value, or compute, store and return it.
    pub fn get_or_insert_with<E>(
        &self,
        document: &Path,
        compute: impl FnOnce() -> Result<String, E>,
    ) -> Result<String, E>
    where
        E: From<io::Error>,
    {
        if let Some(value) = self.get(document)? {
            return Ok(value);
        }
        let value = compute()?;
        self.put(document, &value)?;
        Ok(value)
    }

    pub fn invalidate(&self, document: &Path) -> io::Result<()> {
        match fs::remove_file(self.sidecar_path(document)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// Remove every sidecar of `document`.
pub fn invalidate_all(document: &Path) -> io::Result<()> {
    SidecarCache::new(CacheKind::Summary).invalidate(document)?;
    SidecarCache::new(CacheKind::Ocr).invalidate(document)
}
