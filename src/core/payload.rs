//! Decoding of the playback configuration embedded in a track page.
//!
//! The page assigns a large object literal to a global inside one of the
//! `<script>` children of `<body>`. We find that script, strip the
//! assignment and read the literal as JSON.

use scraper::{Html, Selector};
use serde_json::Value;

use crate::error::{AcquireError, Result};
use crate::models::TrackMetadata;

const MARKER: &str = "encrypted_media_url";

/// Parses a track page into its [`TrackMetadata`].
pub fn parse_track_page(html: &str) -> Result<TrackMetadata> {
    let document = Html::parse_document(html);
    let script = locate_script(&document)
        .ok_or_else(|| AcquireError::malformed("track configuration script not found"))?;
    let data = decode_assignment(&script)?;
    track_metadata(&data)
}

/// Removes single and double quotes so the text can be embedded in tags
/// and command lines. Idempotent.
pub fn sanitize_lyrics(lyrics: &str) -> String {
    lyrics.chars().filter(|c| *c != '\'' && *c != '"').collect()
}

/// Prefers the script that actually mentions the media locator and falls
/// back to the historical position (fifth child of body).
fn locate_script(document: &Html) -> Option<String> {
    let scripts = Selector::parse("body > script").unwrap();
    let by_content = document
        .select(&scripts)
        .map(|el| el.text().collect::<String>())
        .find(|text| text.contains(MARKER));
    if by_content.is_some() {
        return by_content;
    }

    let positional = Selector::parse("body > script:nth-child(5)").unwrap();
    document
        .select(&positional)
        .next()
        .map(|el| el.text().collect::<String>())
        .filter(|text| !text.trim().is_empty())
}

/// `window.__INITIAL_DATA__ = {...};` -> the object as JSON.
fn decode_assignment(script: &str) -> Result<Value> {
    let start = script
        .find('{')
        .ok_or_else(|| AcquireError::malformed("no object literal in script"))?;
    let literal = normalize_literals(&script[start..]);

    // Only the first value matters; trailing statements are ignored.
    let mut values = serde_json::Deserializer::from_str(&literal).into_iter::<Value>();
    match values.next() {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => Err(AcquireError::malformed(format!(
            "unparseable configuration: {}",
            e
        ))),
        None => Err(AcquireError::malformed("empty configuration")),
    }
}

/// Rewrites bare `undefined` (valid in script, not in JSON) to `null`.
/// String contents are left untouched.
fn normalize_literals(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut word = String::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in src.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
            word.push(c);
            continue;
        }
        flush_word(&mut out, &mut word);
        if c == '"' {
            in_string = true;
        }
        out.push(c);
    }
    flush_word(&mut out, &mut word);
    out
}

fn flush_word(out: &mut String, word: &mut String) {
    if word == "undefined" {
        out.push_str("null");
    } else {
        out.push_str(word);
    }
    word.clear();
}

fn track_metadata(data: &Value) -> Result<TrackMetadata> {
    let song = data
        .pointer("/song/song")
        .ok_or_else(|| AcquireError::malformed("song.song missing from configuration"))?;

    let locator = song
        .get(MARKER)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AcquireError::malformed("encrypted_media_url missing"))?;

    let has_lyrics = match song.get("has_lyrics") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true",
        _ => false,
    };
    let lyrics = if has_lyrics {
        song.pointer("/lyrics/content").and_then(Value::as_str)
    } else {
        None
    };

    Ok(TrackMetadata::new(locator, lyrics))
}
