//! Per-document `errors.txt` writer.
//!
//! Grounded on the error-type conventions in [`crate::errors`] (an error
//! always carries a source name and a human message) combined with
//! `time`-based timestamp formatting, the same crate `adammharris-diaryx-cli`
//! reaches for to stamp its own log lines. The `<type>` token in each
//! written line is derived from [`ErrorKey`] (`layer`/`layer-comp`/
//! `document`), not from the free-text category a caller logs alongside it.

use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;

use crate::document::LayerId;
use crate::errors::Result;

/// What an error is attributed to, so a later resolution can find and
/// clear the right line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKey {
    Layer(LayerId),
    Comp(u64),
    Document,
}

impl ErrorKey {
    /// The `<type>` token written to `errors.txt` for this key.
    fn type_token(self) -> &'static str {
        match self {
            Self::Layer(_) => "layer",
            Self::Comp(_) => "layer-comp",
            Self::Document => "document",
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    source_name: String,
    message: String,
}

/// Tracks the live set of errors for one document and mirrors it to
/// `<base-path>/errors.txt`. A freshly recorded error is appended without
/// disturbing the rest of the file; clearing or replacing one requires a
/// full rewrite, since a single line can't otherwise be retracted.
pub struct ErrorSink {
    path: PathBuf,
    entries: FxHashMap<ErrorKey, Entry>,
}

impl ErrorSink {
    #[must_use]
    pub fn new(base_path: &Path) -> Self {
        Self { path: base_path.join("errors.txt"), entries: FxHashMap::default() }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records a new or updated error under `key` and appends its line.
    /// If `key` already had an entry, the file is rewritten instead so
    /// the stale line doesn't linger alongside the new one.
    pub async fn record(&mut self, key: ErrorKey, source_name: impl Into<String>, message: impl Into<String>) -> Result<()> {
        let entry = Entry { source_name: source_name.into(), message: message.into() };
        let replacing = self.entries.insert(key, entry.clone()).is_some();
        if replacing {
            self.rewrite().await
        } else {
            self.append(key, &entry).await
        }
    }

    /// Clears the error recorded under `key`, if any, and rewrites (or
    /// removes) the file to reflect the change.
    pub async fn clear(&mut self, key: ErrorKey) -> Result<()> {
        if self.entries.remove(&key).is_some() {
            self.rewrite().await
        } else {
            Ok(())
        }
    }

    /// Replaces the entire error set at once (e.g. on a full document
    /// re-init) and rewrites the file from scratch.
    pub async fn reset(&mut self, errors: Vec<(ErrorKey, String, String)>) -> Result<()> {
        self.entries = errors.into_iter().map(|(key, source_name, message)| (key, Entry { source_name, message })).collect();
        self.rewrite().await
    }

    async fn append(&self, key: ErrorKey, entry: &Entry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|source| crate::errors::AssetForgeError::FileSystemError { path: parent.to_path_buf(), source })?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|source| crate::errors::AssetForgeError::FileSystemError { path: self.path.clone(), source })?;
        file.write_all(format_line(key, entry).as_bytes()).await.map_err(|source| crate::errors::AssetForgeError::FileSystemError { path: self.path.clone(), source })
    }

    async fn rewrite(&self) -> Result<()> {
        if self.entries.is_empty() {
            return match tokio::fs::remove_file(&self.path).await {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(source) => Err(crate::errors::AssetForgeError::FileSystemError { path: self.path.clone(), source }),
            };
        }
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|source| crate::errors::AssetForgeError::FileSystemError { path: parent.to_path_buf(), source })?;
        }
        let mut entries: Vec<(&ErrorKey, &Entry)> = self.entries.iter().collect();
        entries.sort_by(|(_, a), (_, b)| a.source_name.cmp(&b.source_name).then(a.message.cmp(&b.message)));
        let mut contents = String::new();
        for (key, entry) in entries {
            contents.push_str(&format_line(*key, entry));
        }
        tokio::fs::write(&self.path, contents).await.map_err(|source| crate::errors::AssetForgeError::FileSystemError { path: self.path.clone(), source })
    }
}

fn format_line(key: ErrorKey, entry: &Entry) -> String {
    let timestamp = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let stamp = timestamp.format(&Rfc3339).unwrap_or_else(|_| "unknown-time".to_string());
    format!("[{stamp}] {} \"{}\": {}\n", key.type_token(), entry.source_name, entry.message)
}
