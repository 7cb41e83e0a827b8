use std::path::Path;

use tracing::debug;

use crate::error::{AcquireError, Result};

/// Fetches cover art. A single attempt, no retry.
pub trait PosterFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

pub struct HttpPosterFetcher {
    client: reqwest::blocking::Client,
}

impl HttpPosterFetcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: reqwest::blocking::Client::builder().build()?,
        })
    }
}

impl PosterFetcher for HttpPosterFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        if url.is_empty() {
            return Err(AcquireError::NotFound);
        }

        let data = self
            .client
            .get(url)
            .send()?
            .error_for_status()?
            .bytes()?;

        std::fs::write(dest, &data)?;
        debug!(bytes = data.len(), path = %dest.display(), "poster saved");
        Ok(())
    }
}
