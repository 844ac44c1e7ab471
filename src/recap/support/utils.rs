use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub const SUBTITLE_EXTENSIONS: &[&str] = &["srt"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "webm", "m4v", "ts"];

pub fn canonicalize_existing(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        anyhow::bail!("{} does not exist", path.display());
    }
    path.canonicalize()
        .with_context(|| format!("Failed to canonicalize path {}", path.display()))
}

pub fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

pub fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    lowercase_extension(path)
        .map(|ext| allowed.contains(&ext.as_str()))
        .unwrap_or(false)
}

pub fn file_name_string(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Read a text file, tolerating invalid UTF-8 (legacy subtitle encodings).
pub async fn read_text_lossy(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
