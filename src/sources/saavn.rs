use std::path::Path;

use reqwest::blocking::RequestBuilder;
use serde::Deserialize;
use tracing::debug;

use crate::core::{payload, stream};
use crate::error::{AcquireError, Result};
use crate::models::TrackMetadata;
use crate::sources::{ProgressObserver, SourceSession, StreamSource};

const API_URL: &str = "https://www.jiosaavn.com/api.php";
const CONTEXT: &str = "web6dot0";
const API_VERSION: &str = "4";
/// Stream quality asked of the token exchange, in kbps.
const BITRATE: &str = "320";
const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 ",
    "(KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
);

/// JioSaavn client. Resolves queries to track pages and opens sessions for
/// the token, exchange and download calls.
pub struct SaavnClient {
    client: reqwest::blocking::Client,
    api_url: String,
}

#[derive(Deserialize)]
struct AutocompleteResponse {
    #[serde(default)]
    songs: AutocompleteSongs,
}

#[derive(Deserialize, Default)]
struct AutocompleteSongs {
    #[serde(default)]
    data: Vec<AutocompleteEntry>,
}

#[derive(Deserialize)]
struct AutocompleteEntry {
    url: String,
}

#[derive(Deserialize)]
struct AuthTokenResponse {
    auth_url: Option<String>,
}

impl SaavnClient {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            api_url: API_URL.to_string(),
        })
    }

    fn autocomplete_request(&self, query: &str) -> RequestBuilder {
        self.client.get(&self.api_url).query(&[
            ("__call", "autocomplete.get"),
            ("query", query),
            ("_format", "json"),
            ("_marker", "0"),
            ("ctx", CONTEXT),
        ])
    }
}

fn build_client() -> Result<reqwest::blocking::Client> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(USER_AGENT)
        .cookie_store(true)
        .build()?;
    Ok(client)
}

impl StreamSource for SaavnClient {
    fn resolve(&self, query: &str) -> Result<String> {
        let body = self
            .autocomplete_request(query)
            .send()?
            .error_for_status()?
            .text()?;

        let url = first_song_url(&body)?;
        debug!(query, url = %url, "resolved stream page");
        Ok(url)
    }

    fn open_session(&self) -> Result<Box<dyn SourceSession>> {
        Ok(Box::new(SaavnSession {
            client: build_client()?,
            api_url: self.api_url.clone(),
        }))
    }
}

/// One attempt's worth of shared cookie and connection state.
pub struct SaavnSession {
    client: reqwest::blocking::Client,
    api_url: String,
}

impl SaavnSession {
    fn auth_token_request(&self, encrypted_media_url: &str) -> RequestBuilder {
        self.client.get(&self.api_url).query(&[
            ("__call", "song.generateAuthToken"),
            ("url", encrypted_media_url),
            ("bitrate", BITRATE),
            ("api_version", API_VERSION),
            ("_format", "json"),
            ("ctx", CONTEXT),
            ("_marker", "0"),
        ])
    }
}

impl SourceSession for SaavnSession {
    fn extract(&self, page_url: &str) -> Result<TrackMetadata> {
        let html = self
            .client
            .get(page_url)
            .send()?
            .error_for_status()?
            .text()?;
        payload::parse_track_page(&html)
    }

    fn exchange(&self, encrypted_media_url: &str) -> Result<String> {
        let body = self
            .auth_token_request(encrypted_media_url)
            .send()?
            .error_for_status()?
            .text()?;
        auth_url(&body)
    }

    fn download(
        &self,
        url: &str,
        dest: &Path,
        progress: &mut dyn ProgressObserver,
    ) -> Result<u64> {
        let resp = self.client.get(url).send()?.error_for_status()?;
        let length = resp.content_length();
        stream::write_chunked(resp, dest, length, progress)
    }
}

/// First entry of the autocomplete song list.
fn first_song_url(body: &str) -> Result<String> {
    let resp: AutocompleteResponse = serde_json::from_str(body)
        .map_err(|e| AcquireError::malformed(format!("autocomplete response: {}", e)))?;
    resp.songs
        .data
        .into_iter()
        .next()
        .map(|entry| entry.url)
        .ok_or(AcquireError::NotFound)
}

fn auth_url(body: &str) -> Result<String> {
    let resp: AuthTokenResponse = serde_json::from_str(body)
        .map_err(|e| AcquireError::malformed(format!("auth token response: {}", e)))?;
    resp.auth_url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| AcquireError::malformed("auth_url missing from token response"))
}
