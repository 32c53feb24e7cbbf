//! Streaming download of release artifacts.

use crate::error::{Result, UpdateError};
use futures_util::TryStreamExt;
use reqwest::{Client, Url};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

/// Fixed read buffer; memory use does not grow with artifact size.
pub const READ_BUFFER_SIZE: usize = 81_920;

/// Progress sink, called with a fraction in `[0, 1]`.
pub type ProgressFn<'a> = &'a (dyn Fn(f64) + Send + Sync);

/// Downloads artifacts into the per-application updates directory.
#[derive(Debug, Clone)]
pub struct ArtifactFetcher {
    client: Client,
    updates_dir: PathBuf,
}

impl ArtifactFetcher {
    pub fn new(client: Client, updates_dir: PathBuf) -> Self {
        Self {
            client,
            updates_dir,
        }
    }

    pub fn updates_dir(&self) -> &Path {
        &self.updates_dir
    }

    /// Stream `url` to `<updates_dir>/<remote base name>` and return that path.
    ///
    /// An existing file of the same name is truncated. On failure or
    /// cancellation the partial file stays on disk.
    pub async fn download(
        &self,
        url: &str,
        on_progress: Option<ProgressFn<'_>>,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let file_name = file_name_from_url(url)?;
        tokio::fs::create_dir_all(&self.updates_dir).await?;
        let dest = self.updates_dir.join(file_name);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::warn!("Download of {url} cancelled");
                Err(UpdateError::Cancelled)
            }
            result = self.stream_to_file(url, &dest, on_progress) => result.map(|()| dest),
        }
    }

    async fn stream_to_file(
        &self,
        url: &str,
        dest: &Path,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<()> {
        log::info!("Downloading: {url}");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| UpdateError::Network(format!("cannot download {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::Network(format!(
                "download failed with status {status} for {url}"
            )));
        }

        let total = response.content_length();
        let body = response.bytes_stream().map_err(std::io::Error::other);
        let mut reader = StreamReader::new(Box::pin(body));

        log::info!("Saving to: {}", dest.display());
        let mut file = tokio::fs::File::create(dest).await?;
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        let mut received: u64 = 0;

        loop {
            let n = reader
                .read(&mut buffer)
                .await
                .map_err(|e| UpdateError::Network(format!("download of {url} interrupted: {e}")))?;
            if n == 0 {
                break;
            }
            file.write_all(&buffer[..n]).await?;
            received += n as u64;

            if let (Some(report), Some(fraction)) = (on_progress, progress_fraction(received, total)) {
                report(fraction);
            }
        }

        file.flush().await?;
        log::info!("Download complete: {received} bytes");
        Ok(())
    }
}

/// Fraction of the body received, or `None` when the length is unknown.
pub fn progress_fraction(received: u64, total: Option<u64>) -> Option<f64> {
    match total {
        Some(total) if total > 0 => Some((received as f64 / total as f64).min(1.0)),
        _ => None,
    }
}

/// Base name of the URL path, e.g. `KiotaUiClient-linux.zip`.
pub fn file_name_from_url(url: &str) -> Result<String> {
    let parsed =
        Url::parse(url).map_err(|e| UpdateError::Parse(format!("invalid download URL {url}: {e}")))?;

    parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(str::to_string)
        .ok_or_else(|| UpdateError::Parse(format!("download URL {url} has no file name")))
}
