//! Base-path computation and empty-directory cleanup.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

/// 255 on darwin, 260 elsewhere.
#[cfg(target_os = "macos")]
pub const MAX_PATH: usize = 255;
#[cfg(not(target_os = "macos"))]
pub const MAX_PATH: usize = 260;

fn ignored_file_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\.DS_Store|desktop\.ini)$").unwrap())
}

#[must_use]
pub fn is_ignored_file(name: &str) -> bool {
    ignored_file_re().is_match(name)
}

/// `<document-directory>/<document-filename-without-ext>-assets` when the
/// document has an on-disk path, otherwise `<desktop>/<document-name>-assets`.
#[must_use]
pub fn compute_base_path(document_path: Option<&Path>, document_name: &str) -> PathBuf {
    let stem = document_path
        .and_then(|p| p.file_stem())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| strip_extension(document_name));

    match document_path.and_then(Path::parent) {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(format!("{stem}-assets")),
        _ => desktop_dir().join(format!("{stem}-assets")),
    }
}

fn strip_extension(name: &str) -> String {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name[..idx].to_string(),
        _ => name.to_string(),
    }
}

fn desktop_dir() -> PathBuf {
    let home = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")).unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join("Desktop")
}

/// `base_path.len() + asset_path.len() + 1 < MAX_PATH`, rearranged to a
/// budget the caller compares an asset path's length against.
#[must_use]
pub fn path_budget(base_path: &Path) -> usize {
    MAX_PATH.saturating_sub(base_path.as_os_str().len() + 1)
}

/// Recursively removes `dir` and then each ancestor up to (not including)
/// `base`, stopping at the first directory that still has a real entry
/// (anything other than an ignored file).
pub async fn remove_empty_parents(dir: &Path, base: &Path) -> std::io::Result<()> {
    let mut current = dir.to_path_buf();
    loop {
        if current == *base || !current.starts_with(base) {
            return Ok(());
        }
        if !directory_is_empty(&current).await? {
            return Ok(());
        }
        match tokio::fs::remove_dir(&current).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
        let Some(parent) = current.parent() else { return Ok(()) };
        current = parent.to_path_buf();
    }
}

async fn directory_is_empty(dir: &Path) -> std::io::Result<bool> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if !is_ignored_file(&name.to_string_lossy()) {
            return Ok(false);
        }
    }
    Ok(true)
}
