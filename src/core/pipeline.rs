//! Per-song acquisition: resolve, fetch poster, then extract/exchange/
//! download as one retried unit, then optional post-processing.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::core::paths::{self, SongPaths};
use crate::core::poster::PosterFetcher;
use crate::core::retry::{Exhausted, RetryPolicy, Sleeper, ThreadSleeper};
use crate::core::transcoder::{self, Transcoder};
use crate::error::AcquireError;
use crate::models::{DownloadOutcome, Song, TrackMetadata};
use crate::sources::{ProgressObserver, StreamSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolving,
    ExtractingToken,
    Exchanging,
    Downloading,
    PostProcessing,
    Done,
    Aborted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resolving => "resolving",
            Self::ExtractingToken => "extracting token",
            Self::Exchanging => "exchanging",
            Self::Downloading => "downloading",
            Self::PostProcessing => "post-processing",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

pub struct Pipeline {
    source: Box<dyn StreamSource>,
    posters: Box<dyn PosterFetcher>,
    transcoder: Option<Box<dyn Transcoder>>,
    sleeper: Box<dyn Sleeper>,
    policy: RetryPolicy,
}

impl Pipeline {
    pub fn new(source: Box<dyn StreamSource>, posters: Box<dyn PosterFetcher>) -> Self {
        Self {
            source,
            posters,
            transcoder: None,
            sleeper: Box::new(ThreadSleeper),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_transcoder(mut self, transcoder: Option<Box<dyn Transcoder>>) -> Self {
        self.transcoder = transcoder;
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Downloads one song into `dest_dir`. Never fails: every per-song
    /// problem ends up in the returned outcome.
    pub fn download(
        &self,
        song: &Song,
        dest_dir: &Path,
        progress: &mut dyn ProgressObserver,
    ) -> DownloadOutcome {
        if !song.is_searchable() {
            warn!(title = %song.title, "song has no title or artist, skipping");
            return DownloadOutcome::NotFound;
        }
        let paths = SongPaths::new(dest_dir, &song.title);

        debug!(song = %song, stage = %Stage::Resolving);
        let Some(page_url) = self.resolve(song) else {
            error!(title = %song.title, stage = %Stage::Aborted, "could not download song");
            return DownloadOutcome::NotFound;
        };

        self.fetch_poster(song, &paths);

        let metadata = match self.acquire(&page_url, &paths, progress) {
            Ok(metadata) => metadata,
            Err((stage, exhausted)) => {
                error!(
                    title = %song.title,
                    stage = %stage,
                    attempts = exhausted.attempts,
                    error = %exhausted.error,
                    "could not download song"
                );
                discard(&paths);
                return DownloadOutcome::Abandoned {
                    attempts: exhausted.attempts,
                    last_error: format!("{}: {}", stage, exhausted.error),
                };
            }
        };

        let files = self.post_process(song, &paths, &metadata);
        debug!(title = %song.title, stage = %Stage::Done);
        DownloadOutcome::Completed { files }
    }

    fn resolve(&self, song: &Song) -> Option<String> {
        let query = song.search_query();
        match self
            .policy
            .run(self.sleeper.as_ref(), "stream lookup", |_| self.source.resolve(&query))
        {
            Ok(url) => Some(url),
            Err(Exhausted {
                error: AcquireError::NotFound,
                ..
            }) => {
                error!(query = %query, "no song found");
                None
            }
            Err(e) => {
                error!(
                    query = %query,
                    attempts = e.attempts,
                    error = %e.error,
                    "could not get song download url"
                );
                None
            }
        }
    }

    fn fetch_poster(&self, song: &Song, paths: &SongPaths) {
        match self.posters.fetch(&song.poster_url, &paths.poster) {
            Ok(()) => debug!(title = %song.title, "poster downloaded"),
            Err(e) => warn!(title = %song.title, error = %e, "could not download poster"),
        }
    }

    /// Extract, exchange and download, retried together from the top with a
    /// fresh session each attempt.
    fn acquire(
        &self,
        page_url: &str,
        paths: &SongPaths,
        progress: &mut dyn ProgressObserver,
    ) -> Result<TrackMetadata, (Stage, Exhausted)> {
        let mut stage = Stage::ExtractingToken;
        let result = self
            .policy
            .run(self.sleeper.as_ref(), "download attempt", |attempt| {
                stage = Stage::ExtractingToken;
                debug!(attempt, stage = %stage);
                let session = self.source.open_session()?;
                let metadata = session.extract(page_url)?;
                debug!(lyrics = metadata.has_lyrics(), "track metadata decoded");

                stage = Stage::Exchanging;
                debug!(attempt, stage = %stage);
                let url = session.exchange(&metadata.encrypted_media_url)?;

                stage = Stage::Downloading;
                debug!(attempt, stage = %stage);
                let bytes = session.download(&url, &paths.raw, progress)?;
                info!(bytes, path = %paths.raw.display(), "downloaded");
                Ok(metadata)
            });
        result.map_err(|e| (stage, e))
    }

    fn post_process(
        &self,
        song: &Song,
        paths: &SongPaths,
        metadata: &TrackMetadata,
    ) -> Vec<PathBuf> {
        let raw_files = || SongPaths::existing(&[paths.raw.as_path(), paths.poster.as_path()]);

        let Some(transcoder) = &self.transcoder else {
            return raw_files();
        };

        debug!(title = %song.title, stage = %Stage::PostProcessing);
        match transcoder::finalize(transcoder.as_ref(), paths, song, metadata.lyrics.as_deref()) {
            Ok(files) => files,
            Err(e) => {
                warn!(
                    title = %song.title,
                    error = %e,
                    "post-processing failed, keeping raw download"
                );
                raw_files()
            }
        }
    }
}

/// Drops whatever a failed song left behind.
fn discard(song_paths: &SongPaths) {
    for path in [&song_paths.raw, &song_paths.poster] {
        if !paths::remove_if_present(path) {
            warn!(path = %path.display(), "partial download left on disk");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::io::Cursor;
    use std::rc::Rc;
    use std::time::Duration;

    use id3::{Tag, TagLike};

    use super::*;
    use crate::core::retry::testing::RecordingSleeper;
    use crate::core::stream;
    use crate::core::transcoder::testing::CopyTranscoder;
    use crate::error::Result;
    use crate::sources::{NoProgress, SourceSession};

    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Step {
        Extract,
        Exchange,
        Download,
    }

    #[derive(Default)]
    struct Script {
        resolve_calls: u32,
        resolve_not_found: bool,
        resolve_transport_failures: u32,
        sessions: u32,
        fail_step: Option<Step>,
        failures_left: u32,
        lyrics: Option<String>,
        exchanged: Vec<String>,
    }

    #[derive(Clone, Default)]
    struct FakeSource(Rc<RefCell<Script>>);

    impl StreamSource for FakeSource {
        fn resolve(&self, _query: &str) -> Result<String> {
            let mut s = self.0.borrow_mut();
            s.resolve_calls += 1;
            if s.resolve_not_found {
                return Err(AcquireError::NotFound);
            }
            if s.resolve_transport_failures > 0 {
                s.resolve_transport_failures -= 1;
                return Err(AcquireError::Io(std::io::Error::other("timed out")));
            }
            Ok("https://www.jiosaavn.com/song/kabira/abc".to_string())
        }

        fn open_session(&self) -> Result<Box<dyn SourceSession>> {
            self.0.borrow_mut().sessions += 1;
            Ok(Box::new(self.clone()))
        }
    }

    impl FakeSource {
        fn maybe_fail(&self, step: Step) -> Result<()> {
            let mut s = self.0.borrow_mut();
            if s.fail_step == Some(step) && s.failures_left > 0 {
                s.failures_left -= 1;
                return Err(AcquireError::malformed("flaky upstream"));
            }
            Ok(())
        }
    }

    impl SourceSession for FakeSource {
        fn extract(&self, _page_url: &str) -> Result<TrackMetadata> {
            self.maybe_fail(Step::Extract)?;
            let lyrics = self.0.borrow().lyrics.clone();
            Ok(TrackMetadata::new("abc", lyrics.as_deref()))
        }

        fn exchange(&self, encrypted_media_url: &str) -> Result<String> {
            self.maybe_fail(Step::Exchange)?;
            self.0
                .borrow_mut()
                .exchanged
                .push(encrypted_media_url.to_string());
            Ok("https://aac.saavncdn.com/abc.mp4?sig=1".to_string())
        }

        fn download(
            &self,
            _url: &str,
            dest: &Path,
            progress: &mut dyn ProgressObserver,
        ) -> Result<u64> {
            self.maybe_fail(Step::Download)?;
            stream::write_chunked(Cursor::new(vec![9u8; 2048]), dest, Some(2048), progress)
        }
    }

    #[derive(Clone, Default)]
    struct FakePosters {
        missing: bool,
        calls: Rc<RefCell<u32>>,
    }

    impl PosterFetcher for FakePosters {
        fn fetch(&self, _url: &str, dest: &Path) -> Result<()> {
            *self.calls.borrow_mut() += 1;
            if self.missing {
                return Err(AcquireError::malformed("HTTP 404"));
            }
            std::fs::write(dest, [0xFF, 0xD8, 0xFF, 0xE0])?;
            Ok(())
        }
    }

    struct SharedSleeper(Rc<RecordingSleeper>);

    impl Sleeper for SharedSleeper {
        fn sleep(&self, duration: Duration) {
            self.0.sleep(duration);
        }
    }

    struct Harness {
        source: FakeSource,
        posters: FakePosters,
        sleeper: Rc<RecordingSleeper>,
        pipeline: Pipeline,
    }

    fn harness(script: Script, posters: FakePosters, transcode: bool) -> Harness {
        let source = FakeSource(Rc::new(RefCell::new(script)));
        let sleeper = Rc::new(RecordingSleeper::default());
        let transcoder: Option<Box<dyn Transcoder>> = if transcode {
            Some(Box::new(CopyTranscoder))
        } else {
            None
        };
        let pipeline = Pipeline::new(Box::new(source.clone()), Box::new(posters.clone()))
            .with_transcoder(transcoder)
            .with_sleeper(Box::new(SharedSleeper(sleeper.clone())));
        Harness {
            source,
            posters,
            sleeper,
            pipeline,
        }
    }

    fn kabir() -> Song {
        Song::new(
            "Kabir",
            "Pritam, Tochi Raina, Rekha Bhardwaj",
            "2001",
            "https://i.scdn.co/image/ab67616d0000b273707ea5b8023ac77d31756ed4",
        )
    }

    fn listing(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_full_success_with_transcoding() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(
            Script {
                lyrics: Some("It's \"great\"".to_string()),
                ..Default::default()
            },
            FakePosters::default(),
            true,
        );

        let outcome = h.pipeline.download(&kabir(), dir.path(), &mut NoProgress);

        let final_path = dir.path().join("Kabir.mp3");
        assert_eq!(
            outcome,
            DownloadOutcome::Completed {
                files: vec![final_path.clone()]
            }
        );
        assert_eq!(listing(dir.path()), vec!["Kabir.mp3"]);
        assert_eq!(h.source.0.borrow().exchanged, vec!["abc".to_string()]);

        let tag = Tag::read_from_path(&final_path).unwrap();
        assert_eq!(tag.title(), Some("Kabir"));
        assert_eq!(tag.artist(), Some("Pritam, Tochi Raina, Rekha Bhardwaj"));
        assert_eq!(tag.date_recorded().map(|d| d.year), Some(2001));
        assert_eq!(tag.lyrics().next().map(|l| l.text.as_str()), Some("Its great"));
        assert_eq!(tag.pictures().count(), 1);
        assert!(h.sleeper.pauses.borrow().is_empty());
    }

    #[test]
    fn test_without_transcoder_keeps_raw_files() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(Script::default(), FakePosters::default(), false);

        let outcome = h.pipeline.download(&kabir(), dir.path(), &mut NoProgress);

        assert!(outcome.is_completed());
        assert_eq!(listing(dir.path()), vec!["Kabir.jpg", "Kabir.m4a"]);
        assert_eq!(std::fs::read(dir.path().join("Kabir.m4a")).unwrap().len(), 2048);
    }

    #[test]
    fn test_not_found_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(
            Script {
                resolve_not_found: true,
                ..Default::default()
            },
            FakePosters::default(),
            true,
        );

        let outcome = h.pipeline.download(&kabir(), dir.path(), &mut NoProgress);

        assert_eq!(outcome, DownloadOutcome::NotFound);
        assert_eq!(h.source.0.borrow().resolve_calls, 1);
        assert_eq!(h.source.0.borrow().sessions, 0);
        assert_eq!(*h.posters.calls.borrow(), 0);
        assert!(listing(dir.path()).is_empty());
    }

    #[test]
    fn test_resolver_retries_transport_failures() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(
            Script {
                resolve_transport_failures: 2,
                ..Default::default()
            },
            FakePosters::default(),
            false,
        );

        let outcome = h.pipeline.download(&kabir(), dir.path(), &mut NoProgress);

        assert!(outcome.is_completed());
        assert_eq!(h.source.0.borrow().resolve_calls, 3);
        assert_eq!(h.sleeper.pauses.borrow().len(), 2);
    }

    #[test]
    fn test_resolver_gives_up_as_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(
            Script {
                resolve_transport_failures: 10,
                ..Default::default()
            },
            FakePosters::default(),
            false,
        );

        let outcome = h.pipeline.download(&kabir(), dir.path(), &mut NoProgress);

        assert_eq!(outcome, DownloadOutcome::NotFound);
        assert_eq!(h.source.0.borrow().resolve_calls, 4);
        assert!(listing(dir.path()).is_empty());
    }

    #[test]
    fn test_super_step_recovers_after_failures() {
        for (step, failures) in [(Step::Extract, 1), (Step::Exchange, 2), (Step::Download, 3)] {
            let dir = tempfile::tempdir().unwrap();
            let h = harness(
                Script {
                    fail_step: Some(step),
                    failures_left: failures,
                    ..Default::default()
                },
                FakePosters::default(),
                true,
            );

            let outcome = h.pipeline.download(&kabir(), dir.path(), &mut NoProgress);

            assert!(outcome.is_completed());
            // Every attempt restarts from extraction with a new session.
            assert_eq!(h.source.0.borrow().sessions, failures + 1);
            assert_eq!(
                *h.sleeper.pauses.borrow(),
                vec![Duration::from_secs(5); failures as usize]
            );
            assert_eq!(listing(dir.path()), vec!["Kabir.mp3"]);
        }
    }

    #[test]
    fn test_super_step_abandons_after_four_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(
            Script {
                fail_step: Some(Step::Exchange),
                failures_left: 4,
                ..Default::default()
            },
            FakePosters::default(),
            true,
        );

        let outcome = h.pipeline.download(&kabir(), dir.path(), &mut NoProgress);

        match outcome {
            DownloadOutcome::Abandoned {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 4);
                assert!(last_error.starts_with("exchanging"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(h.source.0.borrow().sessions, 4);
        assert_eq!(h.sleeper.pauses.borrow().len(), 3);
        assert!(listing(dir.path()).is_empty());
    }

    #[test]
    fn test_abandon_survives_undeletable_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the poster goes cannot be removed with remove_file.
        std::fs::create_dir(dir.path().join("Kabir.jpg")).unwrap();
        let h = harness(
            Script {
                fail_step: Some(Step::Download),
                failures_left: 4,
                ..Default::default()
            },
            FakePosters {
                missing: true,
                ..Default::default()
            },
            true,
        );

        let outcome = h.pipeline.download(&kabir(), dir.path(), &mut NoProgress);

        assert!(matches!(
            outcome,
            DownloadOutcome::Abandoned { attempts: 4, .. }
        ));
        assert_eq!(listing(dir.path()), vec!["Kabir.jpg".to_string()]);
    }

    #[test]
    fn test_poster_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(
            Script::default(),
            FakePosters {
                missing: true,
                ..Default::default()
            },
            true,
        );

        let outcome = h.pipeline.download(&kabir(), dir.path(), &mut NoProgress);

        assert!(outcome.is_completed());
        assert_eq!(listing(dir.path()), vec!["Kabir.mp3"]);
        let tag = Tag::read_from_path(dir.path().join("Kabir.mp3")).unwrap();
        assert_eq!(tag.pictures().count(), 0);
    }

    #[test]
    fn test_unsearchable_song_skips_network() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(Script::default(), FakePosters::default(), false);

        let outcome = h
            .pipeline
            .download(&Song::new("", "Pritam", "2001", ""), dir.path(), &mut NoProgress);

        assert_eq!(outcome, DownloadOutcome::NotFound);
        assert_eq!(h.source.0.borrow().resolve_calls, 0);
    }

    #[test]
    fn test_songs_are_isolated_in_a_batch() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(Script::default(), FakePosters::default(), true);
        let songs = [
            kabir(),
            Song::new("Ilahi", "Pritam, Arijit Singh", "2013", "https://img/2"),
        ];

        let outcomes: Vec<DownloadOutcome> = songs
            .iter()
            .map(|s| h.pipeline.download(s, dir.path(), &mut NoProgress))
            .collect();

        assert!(outcomes.iter().all(DownloadOutcome::is_completed));
        assert_eq!(listing(dir.path()), vec!["Ilahi.mp3", "Kabir.mp3"]);
    }
}
