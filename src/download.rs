//! Retrieves chunk artifacts, reusing any already on disk.

use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::{
    error::{ProviderError, RetrievalError, RetrievalFailure},
    plan::Chunk,
};

/// Anything smaller than this cannot hold a dataset and is treated as a failed download.
pub const MIN_ARTIFACT_BYTES: u64 = 300;

/// The upstream data provider.
pub trait Provider {
    /// Writes the chunk's artifact to `target`.
    async fn fetch(&self, chunk: &Chunk, target: &Path) -> Result<(), ProviderError>;
}

/// A downloaded artifact on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawArtifact {
    pub chunk: String,
    pub path: PathBuf,
    pub size: u64,
    /// True when the artifact was found on disk and no request was made.
    pub reused: bool,
}

pub struct Retriever<P> {
    provider: P,
    artifact_dir: PathBuf,
    min_bytes: u64,
}

impl<P: Provider> Retriever<P> {
    pub fn new(provider: P, artifact_dir: PathBuf) -> Self {
        Retriever {
            provider,
            artifact_dir,
            min_bytes: MIN_ARTIFACT_BYTES,
        }
    }

    #[cfg(test)]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn artifact_path(&self, chunk: &Chunk) -> PathBuf {
        self.artifact_dir.join(&chunk.artifact_name)
    }

    pub async fn retrieve(&self, chunk: &Chunk) -> Result<RawArtifact, RetrievalError> {
        let path = self.artifact_path(chunk);
        let io_error = |e: std::io::Error| {
            RetrievalError::new(&chunk.label, RetrievalFailure::Io, e.to_string())
        };

        match fs::metadata(&path) {
            Ok(meta) if meta.len() >= self.min_bytes => {
                debug!(chunk = %chunk.label, path = %path.display(), "Reusing artifact");
                return Ok(RawArtifact {
                    chunk: chunk.label.clone(),
                    path,
                    size: meta.len(),
                    reused: true,
                });
            }
            Ok(meta) => warn!(
                chunk = %chunk.label,
                size = meta.len(),
                "Discarding undersized artifact"
            ),
            Err(_) => {}
        }

        fs::create_dir_all(&self.artifact_dir).map_err(io_error)?;

        // Download beside the final name so a half-written file is never mistaken for an artifact.
        let partial = tempfile::Builder::new()
            .prefix(".partial-")
            .tempfile_in(&self.artifact_dir)
            .map_err(io_error)?;

        info!(chunk = %chunk.label, window = %chunk.window, "Requesting chunk");
        self.provider
            .fetch(chunk, partial.path())
            .await
            .map_err(|e| RetrievalError::new(&chunk.label, e.kind, e.message))?;

        let size = fs::metadata(partial.path()).map_err(io_error)?.len();
        if size < self.min_bytes {
            return Err(RetrievalError::new(
                &chunk.label,
                RetrievalFailure::TooSmall,
                format!("artifact is {size} bytes, below the {} byte minimum", self.min_bytes),
            ));
        }

        partial.persist(&path).map_err(|e| io_error(e.error))?;
        info!(chunk = %chunk.label, size, path = %path.display(), "Artifact saved");

        Ok(RawArtifact {
            chunk: chunk.label.clone(),
            path,
            size,
            reused: false,
        })
    }
}

/// Streams `url` to `file_path`, turning the spinner into a byte bar once the size is known.
pub async fn download_with_progress(
    client: &reqwest::Client,
    url: &str,
    file_path: &Path,
    progress_bar: &ProgressBar,
) -> Result<u64, ProviderError> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(ProviderError::transport(format!(
            "Failed to download file: {}",
            response.status()
        )));
    }

    let total_size = response.content_length().unwrap_or(0);
    if total_size > 0 {
        progress_bar.set_length(total_size);
        if let Ok(style) = ProgressStyle::with_template(
            "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({percent}%) {eta}",
        ) {
            progress_bar.set_style(style.progress_chars("=> "));
        }
    }

    let mut file = File::create(file_path)?;
    let mut downloaded = 0u64;
    let mut stream = response.bytes_stream();

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result
            .map_err(|e| ProviderError::transport(format!("Error reading chunk: {}", e)))?;
        file.write_all(&chunk)?;
        downloaded += chunk.len() as u64;
        progress_bar.set_position(downloaded);
    }
    file.flush()?;

    Ok(downloaded)
}

// -- Tests -------------------------------------------------------------------
