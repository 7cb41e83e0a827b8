use std::fmt;
use std::path::PathBuf;

use crate::core::payload::sanitize_lyrics;

/// A track as reported by the catalog. The title and artist double as the
/// search query sent to the stream source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Song {
    pub title: String,
    /// May be several names joined with ", ".
    pub artist: String,
    /// Free-form release date, e.g. "2001" or "2001-05-07".
    pub year: String,
    pub poster_url: String,
}

impl Song {
    pub fn new(
        title: impl Into<String>,
        artist: impl Into<String>,
        year: impl Into<String>,
        poster_url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            year: year.into(),
            poster_url: poster_url.into(),
        }
    }

    /// Both title and artist must be present for the song to be searchable.
    pub fn is_searchable(&self) -> bool {
        !self.title.trim().is_empty() && !self.artist.trim().is_empty()
    }

    /// Query text for the stream source, spaces preserved. Encoding is left
    /// to the HTTP layer.
    pub fn search_query(&self) -> String {
        format!("{} {}", self.title, self.artist)
    }
}

impl fmt::Display for Song {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} by {} ({}) - {}",
            self.title, self.artist, self.year, self.poster_url
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Album,
    Playlist,
}

impl CollectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Album => "album",
            Self::Playlist => "playlist",
        }
    }
}

/// An album or playlist. Songs are filled in later by a separate catalog
/// request, see [`Collection::set_songs`].
#[derive(Debug, Clone)]
pub struct Collection {
    pub title: String,
    pub id: String,
    pub kind: CollectionKind,
    /// Album artist or playlist owner.
    pub artist: String,
    pub year: String,
    pub songs: Vec<Song>,
}

impl Collection {
    pub fn new(
        title: impl Into<String>,
        id: impl Into<String>,
        kind: CollectionKind,
        artist: impl Into<String>,
        year: Option<String>,
    ) -> Self {
        Self {
            title: title.into(),
            id: id.into(),
            kind,
            artist: artist.into(),
            year: year.unwrap_or_else(|| "NA".to_string()),
            songs: Vec::new(),
        }
    }

    pub fn set_songs(&mut self, songs: Vec<Song>) {
        self.songs = songs;
    }
}

/// One entry of a catalog search.
#[derive(Debug, Clone)]
pub enum SearchResult {
    Song(Song),
    Collection(Collection),
}

impl SearchResult {
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Song(_) => "song",
            Self::Collection(c) => c.kind.as_str(),
        }
    }

    /// `title | year | artist | type`, the line shown in the selection list.
    pub fn summary(&self) -> String {
        let (title, year, artist) = match self {
            Self::Song(s) => (&s.title, &s.year, &s.artist),
            Self::Collection(c) => (&c.title, &c.year, &c.artist),
        };
        format!("{} | {} | {} | {}", title, year, artist, self.kind_label())
    }
}

/// Playback metadata decoded from a track page. Lives only for the
/// duration of one download attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMetadata {
    pub encrypted_media_url: String,
    /// Quote-free lyrics, `None` when the track has none.
    pub lyrics: Option<String>,
}

impl TrackMetadata {
    pub fn new(encrypted_media_url: impl Into<String>, raw_lyrics: Option<&str>) -> Self {
        Self {
            encrypted_media_url: encrypted_media_url.into(),
            lyrics: raw_lyrics.map(sanitize_lyrics),
        }
    }

    pub fn has_lyrics(&self) -> bool {
        self.lyrics.is_some()
    }
}

/// What became of one song.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Files left on disk for this song.
    Completed { files: Vec<PathBuf> },
    NotFound,
    /// Every attempt of the extract/exchange/download step failed.
    Abandoned { attempts: u32, last_error: String },
}

impl DownloadOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn label(&self) -> String {
        match self {
            Self::Completed { files } => files
                .iter()
                .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
                .collect::<Vec<_>>()
                .join(", "),
            Self::NotFound => "not found".to_string(),
            Self::Abandoned {
                attempts,
                last_error,
            } => format!("gave up after {} attempts: {}", attempts, last_error),
        }
    }
}
