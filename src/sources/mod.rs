pub mod saavn;
pub mod spotify;

use std::path::Path;

use crate::error::Result;
use crate::models::{Collection, SearchResult, Song, TrackMetadata};

/// Catalog metadata source: turns free text into songs and collections.
pub trait CatalogSource {
    /// Searches songs, albums and playlists, at most five of each.
    fn search(&self, query: &str) -> anyhow::Result<Vec<SearchResult>>;
    /// Lists the songs of an album or playlist in catalog order.
    fn collection_tracks(&self, collection: &Collection) -> anyhow::Result<Vec<Song>>;
}

/// Source of the actual audio. Resolution is stateless; everything after it
/// runs inside a [`SourceSession`] that shares cookies and connections.
pub trait StreamSource {
    /// Finds the stream page URL for a `"{title} {artist}"` query.
    /// A single attempt; `AcquireError::NotFound` when nothing matches.
    fn resolve(&self, query: &str) -> Result<String>;
    /// Opens a fresh session, scoped to one download attempt.
    fn open_session(&self) -> Result<Box<dyn SourceSession>>;
}

pub trait SourceSession {
    /// Reads the playback metadata embedded in a stream page.
    fn extract(&self, page_url: &str) -> Result<TrackMetadata>;
    /// Trades the encrypted media locator for a short-lived direct URL.
    fn exchange(&self, encrypted_media_url: &str) -> Result<String>;
    /// Streams the direct URL to `dest`, returning the bytes written.
    fn download(
        &self,
        url: &str,
        dest: &Path,
        progress: &mut dyn ProgressObserver,
    ) -> Result<u64>;
}

/// Receives download progress, one call per chunk.
pub trait ProgressObserver {
    /// `total_chunks` is `None` when the server sent no content length.
    fn start(&mut self, total_chunks: Option<u64>);
    fn chunk(&mut self, bytes: usize);
    fn finish(&mut self);
}

/// Discards progress.
#[cfg(test)]
pub struct NoProgress;

#[cfg(test)]
impl ProgressObserver for NoProgress {
    fn start(&mut self, _total_chunks: Option<u64>) {}
    fn chunk(&mut self, _bytes: usize) {}
    fn finish(&mut self) {}
}
