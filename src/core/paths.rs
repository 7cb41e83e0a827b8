use std::path::{Path, PathBuf};

use tracing::debug;

/// Replaces characters that cannot appear in a file name with `_`.
pub fn sanitize_filename(s: &str) -> String {
    let cleaned: String = s
        .trim()
        .chars()
        .map(|c| {
            if c == '/' || c == '\0' {
                return '_';
            }
            if cfg!(target_os = "windows") {
                if matches!(c, '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') {
                    return '_';
                }
                if c.is_ascii_control() {
                    return '_';
                }
            }
            if cfg!(target_os = "macos") && c == ':' {
                return '_';
            }
            c
        })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => "untitled".to_string(),
        _ => cleaned,
    }
}

/// The files one song passes through, all named after its title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongPaths {
    /// `{title}.jpg`
    pub poster: PathBuf,
    /// `{title}.m4a`, the stream as downloaded.
    pub raw: PathBuf,
    /// `{title}_mp3.mp3`, converted but not yet tagged.
    pub intermediate: PathBuf,
    /// `{title}.mp3`
    pub final_audio: PathBuf,
}

impl SongPaths {
    pub fn new(dir: &Path, title: &str) -> Self {
        let stem = sanitize_filename(title);
        Self {
            poster: dir.join(format!("{}.jpg", stem)),
            raw: dir.join(format!("{}.m4a", stem)),
            intermediate: dir.join(format!("{}_mp3.mp3", stem)),
            final_audio: dir.join(format!("{}.mp3", stem)),
        }
    }

    /// Paths among `candidates` that exist on disk, in order.
    pub fn existing(candidates: &[&Path]) -> Vec<PathBuf> {
        candidates
            .iter()
            .filter(|p| p.exists())
            .map(|p| p.to_path_buf())
            .collect()
    }
}

/// Deletes `path` if it exists. Returns false when a file was there but
/// could not be removed; the error is logged, not raised.
pub fn remove_if_present(path: &Path) -> bool {
    if !path.exists() {
        return true;
    }
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "could not remove file");
            false
        }
    }
}

/// Subdirectory of `base` that holds an album or playlist.
pub fn collection_dir(base: &Path, collection_title: &str) -> PathBuf {
    base.join(sanitize_filename(collection_title))
}
