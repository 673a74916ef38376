use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::http::HttpClient;

/// Prefix of the per-job files a transfer streams into before it is renamed
/// onto its destination.
pub const PARTIAL_PREFIX: &str = ".download-";

/// Terminal result of a [`DownloadJob`]. Exactly one is produced per job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Success { bytes: u64 },
    Failure(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub downloaded: u64,
    pub total: Option<u64>,
}

/// A transfer running on a background task.
///
/// The outcome travels over a one-shot channel, so success and failure are
/// mutually exclusive and delivered at most once. Bytes land in a hidden
/// partial file next to the destination and only replace the destination
/// once the stream ends cleanly. Dropping the job aborts the task, which
/// deletes its partial file.
pub struct DownloadJob {
    url: String,
    destination: PathBuf,
    outcome: oneshot::Receiver<DownloadOutcome>,
    task: JoinHandle<()>,
}

impl DownloadJob {
    /// Start streaming `url` into `destination` on the tokio runtime.
    #[must_use]
    pub fn spawn(
        client: Arc<dyn HttpClient>,
        url: impl Into<String>,
        destination: impl Into<PathBuf>,
        progress: Option<mpsc::Sender<DownloadProgress>>,
    ) -> Self {
        Self::spawn_with_lease(client, url, destination, progress, ())
    }

    /// Like [`DownloadJob::spawn`], but `lease` stays alive until the task
    /// itself stops, including after an abort.
    #[must_use]
    pub fn spawn_with_lease<L: Send + 'static>(
        client: Arc<dyn HttpClient>,
        url: impl Into<String>,
        destination: impl Into<PathBuf>,
        progress: Option<mpsc::Sender<DownloadProgress>>,
        lease: L,
    ) -> Self {
        let url = url.into();
        let destination = destination.into();
        let (sender, outcome) = oneshot::channel();

        let task_url = url.clone();
        let task_destination = destination.clone();
        let task = tokio::spawn(async move {
            let _lease = lease;
            let result = transfer(
                client.as_ref(),
                &task_url,
                &task_destination,
                progress.as_ref(),
            )
            .await;
            let outcome = match result {
                Ok(bytes) => DownloadOutcome::Success { bytes },
                Err(message) => {
                    warn!("Download of {task_url} failed: {message}");
                    DownloadOutcome::Failure(message)
                }
            };
            if sender.send(outcome).is_err() {
                debug!("Download of {task_url} finished after its job was abandoned");
            }
        });

        Self {
            url,
            destination,
            outcome,
            task,
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Wait for the terminal outcome.
    ///
    /// A task that ends without reporting (panic or runtime shutdown) counts
    /// as a failure.
    pub async fn wait(mut self) -> DownloadOutcome {
        (&mut self.outcome).await.unwrap_or_else(|_| {
            DownloadOutcome::Failure(format!(
                "Download of {} ended without reporting an outcome",
                self.url
            ))
        })
    }
}

impl Drop for DownloadJob {
    fn drop(&mut self) {
        if !self.task.is_finished() {
            debug!("Aborting download of {}", self.url);
            self.task.abort();
        }
    }
}

async fn transfer(
    client: &dyn HttpClient,
    url: &str,
    dest: &Path,
    progress: Option<&mpsc::Sender<DownloadProgress>>,
) -> Result<u64, String> {
    info!("Downloading {url}");
    let (mut stream, total) = client.get_stream(url).await?;

    let parent = dest
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| format!("Failed to create {}: {e}", parent.display()))?;
    let (file, partial) = tempfile::Builder::new()
        .prefix(PARTIAL_PREFIX)
        .tempfile_in(parent)
        .map_err(|e| format!("Failed to create a download file in {}: {e}", parent.display()))?
        .into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let mut downloaded: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(|e| format!("Failed to write {}: {e}", partial.display()))?;
        downloaded += chunk.len() as u64;
        if let Some(progress) = progress {
            let _ = progress.try_send(DownloadProgress { downloaded, total });
        }
    }

    file.flush()
        .await
        .map_err(|e| format!("Failed to flush {}: {e}", partial.display()))?;
    drop(file);
    partial
        .persist(dest)
        .map_err(|e| format!("Failed to move download to {}: {e}", dest.display()))?;

    info!("Download complete: {downloaded} bytes");
    Ok(downloaded)
}
