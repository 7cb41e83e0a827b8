use thiserror::Error;

/// Errors raised while acquiring a single song.
///
/// The orchestrator never lets these escape a song: they are folded into a
/// [`crate::models::DownloadOutcome`]. `is_retryable` decides whether the
/// retry loop should try the failing step again.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("no matching track on the stream source")]
    NotFound,

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed upstream payload: {what}")]
    MalformedPayload { what: String },

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transcoder failed: {0}")]
    Transcode(String),

    #[error("tag error: {0}")]
    Tag(#[from] id3::Error),
}

impl AcquireError {
    pub fn malformed(what: impl Into<String>) -> Self {
        Self::MalformedPayload { what: what.into() }
    }

    pub fn transcode(message: impl Into<String>) -> Self {
        Self::Transcode(message.into())
    }

    /// Transport hiccups, garbled pages and interrupted writes are worth
    /// another attempt. A missing match or a local post-processing failure
    /// will not change on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::MalformedPayload { .. } | Self::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AcquireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_display() {
        let err = AcquireError::malformed("script element missing");
        assert_eq!(
            err.to_string(),
            "malformed upstream payload: script element missing"
        );
    }

    #[test]
    fn test_retryable_classes() {
        assert!(AcquireError::malformed("x").is_retryable());
        assert!(AcquireError::Io(std::io::Error::other("reset")).is_retryable());
        assert!(!AcquireError::NotFound.is_retryable());
        assert!(!AcquireError::transcode("exit 1").is_retryable());
    }
}
