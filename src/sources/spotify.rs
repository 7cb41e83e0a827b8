use anyhow::{Context, Result};
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::SpotifyConfig;
use crate::models::{Collection, CollectionKind, SearchResult, Song};
use crate::sources::CatalogSource;

const API_BASE: &str = "https://api.spotify.com/v1";
const SEARCH_LIMIT: &str = "5";

pub struct SpotifyClient {
    client: reqwest::blocking::Client,
    access_token: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    tracks: Option<Page<SpotifyTrack>>,
    albums: Option<Page<SpotifyAlbum>>,
    // Spotify returns `null` entries for playlists it cannot show.
    playlists: Option<Page<Option<SpotifyPlaylist>>>,
}

#[derive(Deserialize)]
struct SpotifyTrack {
    name: String,
    artists: Vec<SpotifyArtist>,
    album: SpotifyAlbum,
}

/// Track as listed inside an album, without album details.
#[derive(Deserialize)]
struct SpotifySimpleTrack {
    name: String,
    artists: Vec<SpotifyArtist>,
}

#[derive(Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Deserialize)]
struct SpotifyAlbum {
    #[serde(default)]
    id: String,
    name: String,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
    release_date: Option<String>,
    #[serde(default)]
    images: Vec<SpotifyImage>,
}

#[derive(Deserialize)]
struct FullAlbum {
    #[serde(flatten)]
    album: SpotifyAlbum,
    tracks: Page<SpotifySimpleTrack>,
}

#[derive(Deserialize)]
struct SpotifyImage {
    url: String,
}

#[derive(Deserialize)]
struct SpotifyPlaylist {
    id: String,
    name: String,
    owner: SpotifyOwner,
}

#[derive(Deserialize)]
struct SpotifyOwner {
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct PlaylistItem {
    track: Option<SpotifyTrack>,
}

impl SpotifyClient {
    pub fn new(config: &SpotifyConfig) -> Result<Self> {
        let client_id = config
            .client_id
            .as_ref()
            .context("Spotify client_id is not configured")?;
        let client_secret = config
            .client_secret
            .as_ref()
            .context("Spotify client_secret is not configured")?;

        let client = reqwest::blocking::Client::new();
        let access_token = Self::authenticate(&client, client_id, client_secret)?;

        Ok(Self {
            client,
            access_token,
        })
    }

    fn authenticate(
        client: &reqwest::blocking::Client,
        client_id: &str,
        client_secret: &str,
    ) -> Result<String> {
        let credentials = format!("{}:{}", client_id, client_secret);
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);

        let resp: TokenResponse = client
            .post("https://accounts.spotify.com/api/token")
            .header("Authorization", format!("Basic {}", encoded))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .context("Could not connect to Spotify")?
            .error_for_status()
            .context("Spotify authentication failed. Check client_id and client_secret.")?
            .json()
            .context("Could not parse the Spotify token response")?;

        Ok(resp.access_token)
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T> {
        self.client
            .get(url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .with_context(|| format!("Spotify request failed: {}", url))?
            .error_for_status()
            .with_context(|| format!("Spotify rejected request: {}", url))?
            .json()
            .with_context(|| format!("Could not parse Spotify response: {}", url))
    }

    /// Follows `next` links until the listing is exhausted.
    fn collect_pages<T: DeserializeOwned>(&self, first: Page<T>) -> Result<Vec<T>> {
        let mut items = first.items;
        let mut next = first.next;
        while let Some(url) = next {
            let page: Page<T> = self.get_json(&url, &[])?;
            items.extend(page.items);
            next = page.next;
        }
        Ok(items)
    }

    fn album_tracks(&self, id: &str) -> Result<Vec<Song>> {
        let full: FullAlbum = self.get_json(&format!("{}/albums/{}", API_BASE, id), &[])?;
        let FullAlbum { album, tracks } = full;
        let tracks = self.collect_pages(tracks)?;
        Ok(tracks
            .iter()
            .map(|track| convert_album_track(track, &album))
            .collect())
    }

    fn playlist_tracks(&self, id: &str) -> Result<Vec<Song>> {
        let first: Page<Option<PlaylistItem>> = self.get_json(
            &format!("{}/playlists/{}/tracks", API_BASE, id),
            &[("limit", "100")],
        )?;
        let items = self.collect_pages(first)?;
        Ok(items
            .iter()
            .flatten()
            .filter_map(|item| item.track.as_ref())
            .map(convert_track)
            .collect())
    }
}

fn join_artists(artists: &[SpotifyArtist]) -> String {
    artists
        .iter()
        .map(|a| a.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Spotify lists images widest first; the first one is the cover.
fn first_image(images: &[SpotifyImage]) -> String {
    images
        .first()
        .map(|img| img.url.clone())
        .unwrap_or_default()
}

fn convert_track(track: &SpotifyTrack) -> Song {
    Song::new(
        track.name.clone(),
        join_artists(&track.artists),
        track.album.release_date.clone().unwrap_or_default(),
        first_image(&track.album.images),
    )
}

/// Album listings only carry the track's own artists; the first one is
/// used, with the album's release date and cover.
fn convert_album_track(track: &SpotifySimpleTrack, album: &SpotifyAlbum) -> Song {
    Song::new(
        track.name.clone(),
        track
            .artists
            .first()
            .map(|a| a.name.clone())
            .unwrap_or_default(),
        album.release_date.clone().unwrap_or_default(),
        first_image(&album.images),
    )
}

fn convert_album(album: &SpotifyAlbum) -> Collection {
    Collection::new(
        album.name.clone(),
        album.id.clone(),
        CollectionKind::Album,
        join_artists(&album.artists),
        album
            .release_date
            .as_deref()
            .map(|d| d.chars().take(4).collect()),
    )
}

fn convert_playlist(playlist: &SpotifyPlaylist) -> Collection {
    Collection::new(
        playlist.name.clone(),
        playlist.id.clone(),
        CollectionKind::Playlist,
        playlist.owner.display_name.clone().unwrap_or_default(),
        None,
    )
}

fn convert_search(resp: SearchResponse) -> Vec<SearchResult> {
    let mut results = Vec::new();
    if let Some(tracks) = resp.tracks {
        results.extend(
            tracks
                .items
                .iter()
                .map(|t| SearchResult::Song(convert_track(t))),
        );
    }
    if let Some(albums) = resp.albums {
        results.extend(
            albums
                .items
                .iter()
                .map(|a| SearchResult::Collection(convert_album(a))),
        );
    }
    if let Some(playlists) = resp.playlists {
        results.extend(
            playlists
                .items
                .iter()
                .flatten()
                .map(|p| SearchResult::Collection(convert_playlist(p))),
        );
    }
    results
}

impl CatalogSource for SpotifyClient {
    fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let resp: SearchResponse = self.get_json(
            &format!("{}/search", API_BASE),
            &[
                ("q", query),
                ("type", "track,album,playlist"),
                ("limit", SEARCH_LIMIT),
            ],
        )?;
        Ok(convert_search(resp))
    }

    fn collection_tracks(&self, collection: &Collection) -> Result<Vec<Song>> {
        match collection.kind {
            CollectionKind::Album => self.album_tracks(&collection.id),
            CollectionKind::Playlist => self.playlist_tracks(&collection.id),
        }
    }
}
