use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};

use async_trait::async_trait;
use log::{debug, info, warn};
use switchyard_backend::{
    BackendError, InstallPhase, InstallProgress, InstalledVersion, VersionTag, VersionTagError,
};
use switchyard_platform::{PathEditError, PathEditor, PathSignature};
use tokio::sync::{OwnedMutexGuard, mpsc};

use crate::archive::{self, ArchiveError};
use crate::checksum::{self, ChecksumCheck};
use crate::download::{DownloadJob, DownloadOutcome, DownloadProgress};
use crate::http::HttpClient;
use crate::layout::{self, InstallLayout, RuntimeLayout};

/// Where to fetch a release archive and, optionally, its published digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSource {
    pub url: String,
    pub sha256: Option<String>,
}

/// Runtime-specific lookup of a release archive.
#[async_trait]
pub trait ArchiveResolver: RuntimeLayout {
    /// Resolve the archive for `version`. With `with_checksum`, the published
    /// SHA-256 must be looked up as well.
    async fn resolve_archive(
        &self,
        http: &dyn HttpClient,
        version: &VersionTag,
        with_checksum: bool,
    ) -> Result<ArchiveSource, BackendError>;
}

#[derive(Default)]
struct JobSlots {
    queue: Arc<tokio::sync::Mutex<()>>,
    in_flight: std::sync::Mutex<HashSet<String>>,
}

impl JobSlots {
    fn claim(self: &Arc<Self>, version: &VersionTag) -> Result<SlotGuard, BackendError> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(version.raw().to_string()) {
            return Err(BackendError::InstallInProgress {
                version: version.raw().to_string(),
            });
        }
        Ok(SlotGuard {
            slots: Arc::clone(self),
            version: version.raw().to_string(),
        })
    }
}

struct SlotGuard {
    slots: Arc<JobSlots>,
    version: String,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.slots
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.version);
    }
}

/// Shared by an install and its download task. The version stays claimed,
/// and the queue stays locked, until both have let go.
struct InstallLease {
    _slot: SlotGuard,
    _queued: OwnedMutexGuard<()>,
}

struct Reporter {
    runtime: &'static str,
    version: String,
    sender: Option<mpsc::Sender<InstallProgress>>,
}

impl Reporter {
    fn event(&self, phase: InstallPhase, downloaded: u64, total: Option<u64>) -> InstallProgress {
        InstallProgress {
            runtime: self.runtime,
            version: self.version.clone(),
            phase,
            downloaded,
            total,
        }
    }

    async fn phase(&self, phase: InstallPhase) {
        debug!("{} {}: {phase}", self.runtime, self.version);
        if let Some(sender) = &self.sender {
            let _ = sender.send(self.event(phase, 0, None)).await;
        }
    }

    async fn failed(&self, error: &BackendError) {
        self.phase(InstallPhase::Failed(error.to_string())).await;
    }

    /// Relay byte counts while the download runs. Byte updates are dropped
    /// rather than queued when the receiver lags.
    fn relay_bytes(
        &self,
    ) -> (
        Option<mpsc::Sender<DownloadProgress>>,
        Option<tokio::task::JoinHandle<()>>,
    ) {
        let Some(sender) = self.sender.clone() else {
            return (None, None);
        };
        let (tx, mut rx) = mpsc::channel::<DownloadProgress>(32);
        let template = self.event(InstallPhase::Downloading, 0, None);
        let handle = tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                let _ = sender.try_send(InstallProgress {
                    downloaded: update.downloaded,
                    total: update.total,
                    ..template.clone()
                });
            }
        });
        (Some(tx), Some(handle))
    }
}

/// Install, uninstall and activation for one runtime.
///
/// Clones share the job slots, so a version can only be in flight once and
/// installs of different versions run one after another.
pub struct Lifecycle<R> {
    runtime: Arc<R>,
    install_root: PathBuf,
    http: Arc<dyn HttpClient>,
    path_editor: PathEditor,
    signature: PathSignature,
    verify_checksums: bool,
    jobs: Arc<JobSlots>,
}

impl<R> Clone for Lifecycle<R> {
    fn clone(&self) -> Self {
        Self {
            runtime: Arc::clone(&self.runtime),
            install_root: self.install_root.clone(),
            http: Arc::clone(&self.http),
            path_editor: self.path_editor.clone(),
            signature: self.signature.clone(),
            verify_checksums: self.verify_checksums,
            jobs: Arc::clone(&self.jobs),
        }
    }
}

impl<R: ArchiveResolver> Lifecycle<R> {
    pub fn new(
        runtime: R,
        install_root: impl Into<PathBuf>,
        http: Arc<dyn HttpClient>,
        path_editor: PathEditor,
    ) -> Self {
        let install_root = install_root.into();
        let signature = PathSignature::new(runtime.name(), runtime.bin_token(), &install_root);
        Self {
            runtime: Arc::new(runtime),
            install_root,
            http,
            path_editor,
            signature,
            verify_checksums: true,
            jobs: Arc::default(),
        }
    }

    #[must_use]
    pub fn with_checksum_verification(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    #[must_use]
    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    #[must_use]
    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    #[must_use]
    pub fn http(&self) -> &dyn HttpClient {
        self.http.as_ref()
    }

    #[must_use]
    pub fn layout(&self, version: &VersionTag) -> InstallLayout {
        layout::layout(self.runtime.as_ref(), &self.install_root, version)
    }

    /// Tags the runtime would never list as installed are rejected before
    /// anything touches the network or the install root.
    fn parse_version(&self, raw: &str) -> Result<VersionTag, BackendError> {
        let version: VersionTag = raw.parse()?;
        if !self.runtime.is_version_dir(version.raw()) {
            return Err(VersionTagError::Unrecognized {
                runtime: self.runtime.name(),
                input: version.raw().to_string(),
            }
            .into());
        }
        Ok(version)
    }

    /// Download, validate, verify and extract `version`.
    ///
    /// # Errors
    /// Returns an error when the tag is invalid, the same version is already
    /// being installed, or any pipeline step fails. Artifacts of the failed
    /// step are removed before returning.
    pub async fn install(
        &self,
        version: &str,
        progress: Option<mpsc::Sender<InstallProgress>>,
    ) -> Result<String, BackendError> {
        let version = self.parse_version(version)?;
        let name = self.runtime.name();
        let layout = self.layout(&version);
        let already = || format!("{name} {} is already installed", version.raw());

        if layout::is_installed(&layout.extract_dir) {
            return Ok(already());
        }

        let slot = self.jobs.claim(&version)?;
        let queued = Arc::clone(&self.jobs.queue).lock_owned().await;
        let lease = Arc::new(InstallLease {
            _slot: slot,
            _queued: queued,
        });
        if layout::is_installed(&layout.extract_dir) {
            return Ok(already());
        }

        let reporter = Reporter {
            runtime: name,
            version: version.raw().to_string(),
            sender: progress,
        };
        match self.run_pipeline(&version, &layout, &reporter, &lease).await {
            Ok(()) => {
                reporter.phase(InstallPhase::Installed).await;
                info!("Installed {name} {}", version.raw());
                Ok(format!("Installed {name} {}", version.raw()))
            }
            Err(error) => {
                warn!("Install of {name} {} failed: {error}", version.raw());
                reporter.failed(&error).await;
                Err(error)
            }
        }
    }

    async fn run_pipeline(
        &self,
        version: &VersionTag,
        layout: &InstallLayout,
        reporter: &Reporter,
        lease: &Arc<InstallLease>,
    ) -> Result<(), BackendError> {
        reporter.phase(InstallPhase::Downloading).await;
        let source = self
            .runtime
            .resolve_archive(self.http.as_ref(), version, self.verify_checksums)
            .await?;

        let (bytes_tx, relay) = reporter.relay_bytes();
        let job = DownloadJob::spawn_with_lease(
            Arc::clone(&self.http),
            source.url.clone(),
            layout.download_path.clone(),
            bytes_tx,
            Arc::clone(lease),
        );
        let outcome = job.wait().await;
        if let Some(relay) = relay {
            let _ = relay.await;
        }
        if let DownloadOutcome::Failure(message) = outcome {
            let error = BackendError::network_request("download", message);
            return Err(discard_file(&layout.download_path, error));
        }

        reporter.phase(InstallPhase::Validating).await;
        let archive_path = layout.download_path.clone();
        let valid = tokio::task::spawn_blocking(move || archive::is_valid(&archive_path))
            .await
            .unwrap_or(false);
        if !valid {
            let error = BackendError::validation(version.raw(), "invalid archive");
            return Err(discard_file(&layout.download_path, error));
        }

        if let Some(expected) = source.sha256.filter(|_| self.verify_checksums) {
            self.verify_checksum(version, &layout.download_path, expected)
                .await?;
        }

        reporter.phase(InstallPhase::Extracting).await;
        let archive_path = layout.download_path.clone();
        let extract_dir = layout.extract_dir.clone();
        let extracted = tokio::task::spawn_blocking(move || {
            archive::extract_atomically(&archive_path, &extract_dir)
        })
        .await
        .map_err(|e| BackendError::extraction(version.raw(), e.to_string()))
        .and_then(|result| result.map_err(|e| extraction_error(version, &e)));
        if let Err(error) = extracted {
            let error = discard_dir(&layout.extract_dir, error);
            return Err(discard_file(&layout.download_path, error));
        }

        if let Err(error) = std::fs::remove_file(&layout.download_path) {
            warn!(
                "Could not delete downloaded archive {}: {error}",
                layout.download_path.display()
            );
        }
        Ok(())
    }

    async fn verify_checksum(
        &self,
        version: &VersionTag,
        archive_path: &Path,
        expected: String,
    ) -> Result<(), BackendError> {
        let path = archive_path.to_path_buf();
        let check = tokio::task::spawn_blocking(move || checksum::verify(&path, &expected))
            .await
            .map_err(|e| BackendError::validation(version.raw(), e.to_string()))
            .and_then(|result| {
                result.map_err(|e| BackendError::io_during("checksum verification", &e))
            });
        match check {
            Ok(ChecksumCheck::Match) => {
                debug!("Checksum verified for {}", archive_path.display());
                Ok(())
            }
            Ok(ChecksumCheck::Mismatch { expected, actual }) => {
                let error = BackendError::validation(
                    version.raw(),
                    format!("checksum mismatch (expected {expected}, got {actual})"),
                );
                Err(discard_file(archive_path, error))
            }
            Err(error) => Err(discard_file(archive_path, error)),
        }
    }

    /// Remove an installed version. The active entry is dropped from PATH
    /// when it pointed at this version; no other version is activated.
    ///
    /// # Errors
    /// Returns `NotFound` when the version is not installed and a permission
    /// error when the directory cannot be removed.
    pub async fn uninstall(&self, version: &str) -> Result<String, BackendError> {
        let version = self.parse_version(version)?;
        let name = self.runtime.name();
        let layout = self.layout(&version);
        if !layout::is_installed(&layout.extract_dir) {
            return Err(BackendError::not_found(version.raw()));
        }

        let was_active = self.current_version()?.is_some_and(|active| active == version);

        let extract_dir = layout.extract_dir.clone();
        tokio::task::spawn_blocking(move || std::fs::remove_dir_all(&extract_dir))
            .await
            .map_err(|e| BackendError::IoError {
                kind: std::io::ErrorKind::Other,
                message: e.to_string(),
            })?
            .map_err(|e| BackendError::io_during("uninstall", &e))?;
        info!("Removed {name} {}", version.raw());

        if was_active {
            self.path_editor
                .remove_all(&self.signature)
                .map_err(|e| path_error("deactivate", &e))?;
            return Ok(format!(
                "Uninstalled {name} {}; no {name} version is active now",
                version.raw()
            ));
        }
        Ok(format!("Uninstalled {name} {}", version.raw()))
    }

    /// Point the persisted PATH at an installed version.
    ///
    /// # Errors
    /// Returns `NotFound` when the version is not installed; never installs.
    pub fn activate(&self, version: &str) -> Result<String, BackendError> {
        let version = self.parse_version(version)?;
        let layout = self.layout(&version);
        if !layout::is_installed(&layout.extract_dir) {
            return Err(BackendError::not_found(version.raw()));
        }

        let edit = self
            .path_editor
            .add(&self.signature, &layout.bin_dir)
            .map_err(|e| path_error("activate", &e))?;
        debug!("PATH edit:\n{}", edit.summary());
        Ok(format!("Now using {} {}", self.runtime.name(), version.raw()))
    }

    /// # Errors
    /// Returns an error when the environment store cannot be read.
    pub fn current_version(&self) -> Result<Option<VersionTag>, BackendError> {
        let active = self
            .path_editor
            .read_active(&self.signature)
            .map_err(|e| path_error("read PATH", &e))?;
        Ok(active.and_then(|raw| VersionTag::new(raw).ok()))
    }

    /// # Errors
    /// Returns an error when the install root or environment store cannot be
    /// read.
    pub async fn list_installed(&self) -> Result<Vec<InstalledVersion>, BackendError> {
        let active = self.current_version()?;
        let runtime = Arc::clone(&self.runtime);
        let root = self.install_root.clone();
        let dirs = tokio::task::spawn_blocking(move || {
            layout::installed_dirs(runtime.as_ref(), &root).map(|dirs| {
                dirs.into_iter()
                    .map(|(tag, path)| {
                        let install_date = std::fs::metadata(&path)
                            .and_then(|meta| meta.modified())
                            .ok()
                            .map(chrono::DateTime::<chrono::Utc>::from);
                        (tag, install_date, layout::disk_size(&path))
                    })
                    .collect::<Vec<_>>()
            })
        })
        .await
        .map_err(|e| BackendError::IoError {
            kind: std::io::ErrorKind::Other,
            message: e.to_string(),
        })?
        .map_err(|e| BackendError::io_during("list installed", &e))?;

        debug!(
            "Found {} installed {} versions under {}",
            dirs.len(),
            self.runtime.name(),
            self.install_root.display()
        );
        Ok(dirs
            .into_iter()
            .map(|(version, install_date, size)| InstalledVersion {
                is_active: active.as_ref() == Some(&version),
                version,
                install_date,
                disk_size: Some(size),
            })
            .collect())
    }
}

fn extraction_error(version: &VersionTag, error: &ArchiveError) -> BackendError {
    if error.is_permission_denied() {
        BackendError::PermissionDenied {
            operation: "extract",
            details: error.to_string(),
        }
    } else {
        BackendError::extraction(version.raw(), error.to_string())
    }
}

fn path_error(operation: &'static str, error: &PathEditError) -> BackendError {
    if error.is_permission_denied() {
        BackendError::PermissionDenied {
            operation,
            details: error.to_string(),
        }
    } else {
        BackendError::EnvironmentStore {
            operation,
            details: error.to_string(),
        }
    }
}

fn discard_file(path: &Path, error: BackendError) -> BackendError {
    match std::fs::remove_file(path) {
        Ok(()) => error,
        Err(cleanup) if cleanup.kind() == std::io::ErrorKind::NotFound => error,
        Err(cleanup) => error.with_cleanup_failure(format!("{}: {cleanup}", path.display())),
    }
}

fn discard_dir(path: &Path, error: BackendError) -> BackendError {
    match std::fs::remove_dir_all(path) {
        Ok(()) => error,
        Err(cleanup) if cleanup.kind() == std::io::ErrorKind::NotFound => error,
        Err(cleanup) => error.with_cleanup_failure(format!("{}: {cleanup}", path.display())),
    }
}
