use std::path::Path;

use id3::{Tag, TagLike, Timestamp, Version};

use crate::error::Result;
use crate::models::Song;

/// Writes the song's title, artist, release date, lyrics and cover into an
/// ID3v2.4 tag on `path`. Existing frames of other kinds are kept.
pub fn write_tags(
    path: &Path,
    song: &Song,
    lyrics: Option<&str>,
    cover: Option<&[u8]>,
) -> Result<()> {
    let mut tag = Tag::read_from_path(path).unwrap_or_else(|_| Tag::new());

    tag.set_title(&song.title);
    tag.set_artist(&song.artist);
    if let Some(date) = recording_date(&song.year) {
        tag.set_date_recorded(date);
    }
    if let Some(text) = lyrics.filter(|l| !l.is_empty()) {
        tag.remove_all_lyrics();
        tag.add_frame(id3::frame::Lyrics {
            lang: "eng".to_string(),
            description: String::new(),
            text: text.to_string(),
        });
    }
    if let Some(art_data) = cover {
        tag.remove_all_pictures();
        tag.add_frame(id3::frame::Picture {
            mime_type: detect_mime_type(art_data),
            picture_type: id3::frame::PictureType::CoverFront,
            description: String::new(),
            data: art_data.to_vec(),
        });
    }

    tag.write_to_path(path, Version::Id3v24)?;
    Ok(())
}

/// Parses "2001", "2001-05" or "2001-05-07". Anything else falls back to
/// its leading four-digit year, or nothing.
fn recording_date(year: &str) -> Option<Timestamp> {
    let year = year.trim();
    if let Ok(ts) = year.parse::<Timestamp>() {
        return Some(ts);
    }
    let digits = year.get(..4)?;
    let y = digits.parse::<i32>().ok()?;
    Some(Timestamp {
        year: y,
        month: None,
        day: None,
        hour: None,
        minute: None,
        second: None,
    })
}

/// Guesses the image MIME type from its magic bytes.
fn detect_mime_type(data: &[u8]) -> String {
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        "image/png".to_string()
    } else {
        "image/jpeg".to_string()
    }
}
