use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};
use dialoguer::{Input, MultiSelect};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use crate::config::{self, Config, SpotifyConfig};
use crate::core::paths;
use crate::core::pipeline::Pipeline;
use crate::core::poster::HttpPosterFetcher;
use crate::core::transcoder::{Ffmpeg, Transcoder};
use crate::models::{DownloadOutcome, SearchResult, Song};
use crate::sources::saavn::SaavnClient;
use crate::sources::spotify::SpotifyClient;
use crate::sources::{CatalogSource, ProgressObserver};

#[derive(Parser)]
#[command(
    name = "tunefetch",
    version,
    about = "Search songs, albums and playlists and download them with cover art and tags"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory to download into
    #[arg(long, short, global = true, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Keep the raw .m4a download, skip MP3 conversion and tagging
    #[arg(long, global = true)]
    pub no_transcode: bool,

    /// Show debug logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Spotify client ID
    #[arg(long, global = true, env = "SPOTIPY_CLIENT_ID", hide_env_values = true)]
    pub client_id: Option<String>,

    /// Spotify client secret
    #[arg(long, global = true, env = "SPOTIPY_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search Spotify and download the selected results (default)
    Search {
        /// Search text; prompted for when omitted
        query: Option<String>,
    },
    /// Download a single song without searching the catalog
    Song {
        #[arg(long)]
        title: String,
        #[arg(long)]
        artist: String,
        #[arg(long, default_value = "NA")]
        year: String,
        /// Cover art URL
        #[arg(long)]
        poster: Option<String>,
    },
    /// Configure Spotify credentials
    Config,
}

pub fn run(cli: Cli) -> Result<()> {
    let mut cfg = config::load_config();
    cfg.spotify.override_with(cli.client_id, cli.client_secret);
    if let Some(output) = cli.output {
        cfg.download.output_dir = output;
    }
    if cli.no_transcode {
        cfg.download.transcode = false;
    }

    match cli.command {
        Some(Commands::Search { query }) => cmd_search(&cfg, query),
        None => cmd_search(&cfg, None),
        Some(Commands::Song {
            title,
            artist,
            year,
            poster,
        }) => cmd_song(&cfg, Song::new(title, artist, year, poster.unwrap_or_default())),
        Some(Commands::Config) => cmd_config(),
    }
}

/// Stream source, poster fetcher and, when available, ffmpeg.
fn build_pipeline(cfg: &Config) -> Result<Pipeline> {
    let source = SaavnClient::new().context("Could not create HTTP client")?;
    let posters = HttpPosterFetcher::new().context("Could not create HTTP client")?;

    let transcoder: Option<Box<dyn Transcoder>> = if cfg.download.transcode {
        match Ffmpeg::detect(cfg.download.bitrate) {
            Some(ffmpeg) => Some(Box::new(ffmpeg)),
            None => {
                warn!(
                    "FFmpeg not found! Final file won't be converted to mp3 \
                     and meta data won't be added"
                );
                None
            }
        }
    } else {
        None
    };

    Ok(Pipeline::new(Box::new(source), Box::new(posters))
        .with_transcoder(transcoder)
        .with_retry(cfg.download.retry_policy()))
}

fn cmd_search(cfg: &Config, query: Option<String>) -> Result<()> {
    if !cfg.spotify.is_configured() {
        println!("Spotify is not configured. Run 'tunefetch config' first.");
        return Ok(());
    }

    let catalog = SpotifyClient::new(&cfg.spotify)?;

    let query = match query.filter(|q| !q.trim().is_empty()) {
        Some(q) => q,
        None => Input::<String>::new()
            .with_prompt("Enter the name of a song, album or playlist")
            .validate_with(|input: &String| -> std::result::Result<(), &str> {
                if input.trim().is_empty() {
                    Err("Please enter a valid search term")
                } else {
                    Ok(())
                }
            })
            .interact_text()?,
    };

    let results = catalog.search(&query)?;
    if results.is_empty() {
        println!("No results for \"{}\".", query);
        return Ok(());
    }

    let items: Vec<String> = results.iter().map(SearchResult::summary).collect();
    let choices = MultiSelect::new()
        .with_prompt("Select the songs, albums or playlists to download")
        .items(&items)
        .interact()?;

    if choices.is_empty() {
        println!("Exiting...");
        return Ok(());
    }

    let pipeline = build_pipeline(cfg)?;
    let output = &cfg.download.output_dir;
    std::fs::create_dir_all(output)
        .with_context(|| format!("Could not create {}", output.display()))?;

    let mut report = Vec::new();
    for index in choices {
        match &results[index] {
            SearchResult::Song(song) => {
                report.push(download_one(&pipeline, song, output));
            }
            SearchResult::Collection(collection) => {
                let mut collection = collection.clone();
                println!(
                    "Getting tracks from the {} {}",
                    collection.kind.as_str(),
                    collection.title
                );
                let songs = match catalog.collection_tracks(&collection) {
                    Ok(songs) => songs,
                    Err(e) => {
                        println!("Could not list {}: {:#}", collection.title, e);
                        continue;
                    }
                };
                collection.set_songs(songs);

                let dir = paths::collection_dir(output, &collection.title);
                std::fs::create_dir_all(&dir)
                    .with_context(|| format!("Could not create {}", dir.display()))?;
                for song in &collection.songs {
                    report.push(download_one(&pipeline, song, &dir));
                }
                println!();
            }
        }
    }

    print_report(&report);
    Ok(())
}

fn cmd_song(cfg: &Config, song: Song) -> Result<()> {
    let pipeline = build_pipeline(cfg)?;
    let output = &cfg.download.output_dir;
    std::fs::create_dir_all(output)
        .with_context(|| format!("Could not create {}", output.display()))?;

    let report = vec![download_one(&pipeline, &song, output)];
    print_report(&report);
    Ok(())
}

fn download_one(pipeline: &Pipeline, song: &Song, dir: &Path) -> (Song, DownloadOutcome) {
    println!("Downloading {}...", song.title);
    let mut progress = BarProgress::default();
    let outcome = pipeline.download(song, dir, &mut progress);
    if outcome.is_completed() {
        println!("Downloaded {}!", song.title);
    }
    (song.clone(), outcome)
}

fn print_report(report: &[(Song, DownloadOutcome)]) {
    let mut table = Table::new();
    table.set_header(vec!["Title", "Artist", "Result"]);
    for (song, outcome) in report {
        table.add_row(vec![
            Cell::new(&song.title),
            Cell::new(&song.artist),
            Cell::new(outcome.label()),
        ]);
    }
    println!("{table}");

    let done = report.iter().filter(|(_, o)| o.is_completed()).count();
    println!("\n{} of {} songs downloaded", done, report.len());
}

/// Terminal progress bar counting 1 KB chunks.
#[derive(Default)]
struct BarProgress {
    bar: Option<ProgressBar>,
}

impl ProgressObserver for BarProgress {
    fn start(&mut self, total_chunks: Option<u64>) {
        if let Some(old) = self.bar.take() {
            old.finish_and_clear();
        }
        let bar = match total_chunks {
            Some(total) => {
                let bar = ProgressBar::new(total);
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template("{bar:40.green/black} {pos}/{len} KB [{elapsed_precise}<{eta}]")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("#>-"),
                );
                bar
            }
            None => ProgressBar::new_spinner(),
        };
        self.bar = Some(bar);
    }

    fn chunk(&mut self, _bytes: usize) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish();
        }
    }
}

fn cmd_config() -> Result<()> {
    let mut cfg = config::load_config();

    println!("Spotify API settings");
    println!("(Create credentials at https://developer.spotify.com/dashboard)\n");

    let current_id = cfg.spotify.client_id.clone().unwrap_or_default();

    let client_id: String = Input::new()
        .with_prompt("Client ID")
        .with_initial_text(current_id)
        .interact_text()?;

    let current_secret = cfg.spotify.client_secret.clone().unwrap_or_default();

    let client_secret: String = Input::new()
        .with_prompt("Client Secret")
        .with_initial_text(current_secret)
        .interact_text()?;

    cfg.spotify = SpotifyConfig {
        client_id: Some(client_id),
        client_secret: Some(client_secret),
    };

    config::save_config(&cfg)?;
    println!("\nSettings saved!");
    Ok(())
}
