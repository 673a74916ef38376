use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use tokio::sync::mpsc;

use switchyard_backend::{
    BackendError, InstallProgress, InstalledVersion, RemoteVersion, VersionManager, VersionTag,
};
use switchyard_core::{HttpClient, Lifecycle};
use switchyard_platform::PathEditor;

use crate::index::{parse_releases, remote_versions};
use crate::runtime::GoRuntime;

/// Go toolchains unpacked from the official release archives.
#[derive(Clone)]
pub struct GoBackend {
    lifecycle: Lifecycle<GoRuntime>,
}

impl GoBackend {
    pub fn new(
        runtime: GoRuntime,
        install_root: impl Into<PathBuf>,
        http: Arc<dyn HttpClient>,
        path_editor: PathEditor,
    ) -> Self {
        Self {
            lifecycle: Lifecycle::new(runtime, install_root, http, path_editor),
        }
    }

    #[must_use]
    pub fn with_checksum_verification(mut self, verify: bool) -> Self {
        self.lifecycle = self.lifecycle.with_checksum_verification(verify);
        self
    }
}

#[async_trait]
impl VersionManager for GoBackend {
    fn name(&self) -> &'static str {
        "go"
    }

    fn display_name(&self) -> &'static str {
        "Go"
    }

    fn install_root(&self) -> &Path {
        self.lifecycle.install_root()
    }

    async fn list_remote(&self) -> Result<Vec<RemoteVersion>, BackendError> {
        let url = self.lifecycle.runtime().index_url();
        info!("Fetching Go release index from {url}");
        let listing = self
            .lifecycle
            .http()
            .get_json(url)
            .await
            .map_err(|e| BackendError::network_request("list remote", e))?;
        let releases = parse_releases(listing)
            .map_err(|e| BackendError::network_parse_from("list remote", e))?;
        let remote = remote_versions(&releases);
        debug!("Go index lists {} releases", remote.len());
        Ok(remote)
    }

    async fn list_installed(&self) -> Result<Vec<InstalledVersion>, BackendError> {
        self.lifecycle.list_installed().await
    }

    async fn current_version(&self) -> Result<Option<VersionTag>, BackendError> {
        self.lifecycle.current_version()
    }

    async fn install_with_progress(
        &self,
        version: &str,
        progress: Option<mpsc::Sender<InstallProgress>>,
    ) -> Result<String, BackendError> {
        self.lifecycle.install(version, progress).await
    }

    async fn uninstall(&self, version: &str) -> Result<String, BackendError> {
        self.lifecycle.uninstall(version).await
    }

    async fn use_version(&self, version: &str) -> Result<String, BackendError> {
        self.lifecycle.activate(version)
    }
}
