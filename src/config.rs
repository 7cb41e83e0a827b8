use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::retry::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub spotify: SpotifyConfig,
    #[serde(default)]
    pub download: DownloadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SpotifyConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl SpotifyConfig {
    pub fn is_configured(&self) -> bool {
        self.client_id.as_ref().is_some_and(|s| !s.is_empty())
            && self.client_secret.as_ref().is_some_and(|s| !s.is_empty())
    }

    /// Values from the command line or environment win over the file.
    pub fn override_with(&mut self, client_id: Option<String>, client_secret: Option<String>) {
        if client_id.is_some() {
            self.client_id = client_id;
        }
        if client_secret.is_some() {
            self.client_secret = client_secret;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub output_dir: PathBuf,
    pub transcode: bool,
    pub retry_attempts: u32,
    pub retry_delay_secs: u64,
    /// MP3 encoder bitrate in kbps. Streams are always requested at 320.
    pub bitrate: u32,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("Downloads"),
            transcode: true,
            retry_attempts: 4,
            retry_delay_secs: 5,
            bitrate: 320,
        }
    }
}

impl DownloadConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_secs(self.retry_delay_secs))
    }
}

fn config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home)
        .join(".config")
        .join("tunefetch")
        .join("config.toml")
}

pub fn load_config() -> Config {
    let path = config_path();
    if !path.exists() {
        return Config::default();
    }
    match std::fs::read_to_string(&path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "ignoring unreadable config");
            Config::default()
        }),
        Err(_) => Config::default(),
    }
}

pub fn save_config(config: &Config) -> Result<()> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_sections_missing() {
        let cfg: Config = toml::from_str("").unwrap();
        assert!(!cfg.spotify.is_configured());
        assert_eq!(cfg.download.output_dir, PathBuf::from("Downloads"));
        assert_eq!(cfg.download.retry_policy(), RetryPolicy::default());
        assert_eq!(cfg.download.bitrate, 320);
    }

    #[test]
    fn test_partial_download_section() {
        let cfg: Config = toml::from_str(
            r#"
            [spotify]
            client_id = "id"
            client_secret = "secret"

            [download]
            transcode = false
            retry_delay_secs = 1
            "#,
        )
        .unwrap();
        assert!(cfg.spotify.is_configured());
        assert!(!cfg.download.transcode);
        assert_eq!(cfg.download.retry_attempts, 4);
        assert_eq!(cfg.download.retry_policy().delay, Duration::from_secs(1));
    }

    #[test]
    fn test_override_with() {
        let mut spotify = SpotifyConfig {
            client_id: Some("file-id".to_string()),
            client_secret: Some("file-secret".to_string()),
        };
        spotify.override_with(Some("env-id".to_string()), None);
        assert_eq!(spotify.client_id.as_deref(), Some("env-id"));
        assert_eq!(spotify.client_secret.as_deref(), Some("file-secret"));
    }

    #[test]
    fn test_empty_credentials_not_configured() {
        let spotify = SpotifyConfig {
            client_id: Some(String::new()),
            client_secret: Some("x".to_string()),
        };
        assert!(!spotify.is_configured());
    }

    #[test]
    fn test_round_trip_keeps_download_settings() {
        let mut cfg = Config::default();
        cfg.download.bitrate = 192;
        let text = toml::to_string_pretty(&cfg).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.download.bitrate, 192);
    }
}
