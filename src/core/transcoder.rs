use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::core::paths::{remove_if_present, SongPaths};
use crate::core::tagger;
use crate::error::{AcquireError, Result};
use crate::models::Song;

/// Converts the downloaded container to MP3.
pub trait Transcoder {
    fn convert(&self, input: &Path, output: &Path) -> Result<()>;
}

/// The `ffmpeg` binary on PATH.
pub struct Ffmpeg {
    binary: PathBuf,
    bitrate: u32,
}

impl Ffmpeg {
    /// Checks once whether ffmpeg can be run at all.
    pub fn detect(bitrate: u32) -> Option<Self> {
        let binary = PathBuf::from("ffmpeg");
        let status = Command::new(&binary)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .ok()?;
        if !status.success() {
            return None;
        }
        debug!("ffmpeg available");
        Some(Self { binary, bitrate })
    }
}

impl Transcoder for Ffmpeg {
    fn convert(&self, input: &Path, output: &Path) -> Result<()> {
        let out = Command::new(&self.binary)
            .arg("-y")
            .arg("-i")
            .arg(input)
            .args(["-acodec", "libmp3lame", "-ab"])
            .arg(format!("{}k", self.bitrate))
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let last = stderr.lines().last().unwrap_or("").trim().to_string();
            return Err(AcquireError::transcode(format!(
                "ffmpeg exited with {}: {}",
                out.status, last
            )));
        }
        if !output.exists() {
            return Err(AcquireError::transcode("ffmpeg produced no output"));
        }
        Ok(())
    }
}

/// Converts the raw download, tags the result and swaps it into place.
///
/// Intermediates (raw container, poster, untagged MP3) are removed only once
/// the final file exists. On error the raw container and poster are left
/// untouched and any partial MP3 is discarded.
pub fn finalize(
    transcoder: &dyn Transcoder,
    paths: &SongPaths,
    song: &Song,
    lyrics: Option<&str>,
) -> Result<Vec<PathBuf>> {
    if let Err(e) = convert_and_tag(transcoder, paths, song, lyrics) {
        remove_if_present(&paths.intermediate);
        return Err(e);
    }

    for path in [&paths.raw, &paths.poster] {
        remove_if_present(path);
    }
    info!(path = %paths.final_audio.display(), "tagged");
    Ok(vec![paths.final_audio.clone()])
}

fn convert_and_tag(
    transcoder: &dyn Transcoder,
    paths: &SongPaths,
    song: &Song,
    lyrics: Option<&str>,
) -> Result<()> {
    transcoder.convert(&paths.raw, &paths.intermediate)?;

    let cover = if paths.poster.exists() {
        Some(std::fs::read(&paths.poster)?)
    } else {
        None
    };
    tagger::write_tags(&paths.intermediate, song, lyrics, cover.as_deref())?;

    std::fs::rename(&paths.intermediate, &paths.final_audio)?;
    Ok(())
}
