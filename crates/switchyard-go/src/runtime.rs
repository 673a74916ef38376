use std::path::PathBuf;

use async_trait::async_trait;
use log::debug;
use switchyard_backend::{BackendError, VersionTag};
use switchyard_core::{
    ArchiveResolver, ArchiveSource, HostArch, HostOs, HostTarget, HttpClient, RuntimeLayout,
};

use crate::index;

pub const DEFAULT_DOWNLOAD_BASE: &str = "https://go.dev/dl/";
pub const DEFAULT_INDEX_URL: &str = "https://go.dev/dl/?mode=json";

/// Naming and download rules for Go releases.
#[derive(Debug, Clone)]
pub struct GoRuntime {
    target: HostTarget,
    download_base: String,
    index_url: String,
}

impl GoRuntime {
    #[must_use]
    pub fn new(target: HostTarget) -> Self {
        Self {
            target,
            download_base: DEFAULT_DOWNLOAD_BASE.to_string(),
            index_url: DEFAULT_INDEX_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_download_base(mut self, base: impl Into<String>) -> Self {
        self.download_base = base.into();
        self
    }

    #[must_use]
    pub fn with_index_url(mut self, url: impl Into<String>) -> Self {
        self.index_url = url.into();
        self
    }

    #[must_use]
    pub fn index_url(&self) -> &str {
        &self.index_url
    }

    /// Listing that also carries unstable and archived releases.
    #[must_use]
    pub fn full_index_url(&self) -> String {
        let joiner = if self.index_url.contains('?') { '&' } else { '?' };
        format!("{}{joiner}include=all", self.index_url)
    }

    fn os_name(&self) -> &'static str {
        match self.target.os {
            HostOs::Windows => "windows",
            HostOs::Linux => "linux",
            HostOs::Macos => "darwin",
        }
    }

    fn arch_name(&self) -> &'static str {
        match self.target.arch {
            HostArch::X86_64 => "amd64",
            HostArch::Aarch64 => "arm64",
            HostArch::X86 => "386",
        }
    }

    #[must_use]
    pub fn download_url(&self, version: &VersionTag) -> String {
        format!(
            "{}/{}",
            self.download_base.trim_end_matches('/'),
            self.archive_file_name(version)
        )
    }
}

impl RuntimeLayout for GoRuntime {
    fn name(&self) -> &'static str {
        "go"
    }

    fn archive_file_name(&self, version: &VersionTag) -> String {
        format!(
            "{}.{}-{}.{}",
            version.raw(),
            self.os_name(),
            self.arch_name(),
            self.target.archive_extension()
        )
    }

    fn bin_subdir(&self, _version: &VersionTag) -> PathBuf {
        PathBuf::from("go").join("bin")
    }

    fn bin_token(&self) -> String {
        "bin".to_string()
    }

    fn is_version_dir(&self, name: &str) -> bool {
        name.starts_with("go")
    }
}

#[async_trait]
impl ArchiveResolver for GoRuntime {
    async fn resolve_archive(
        &self,
        http: &dyn HttpClient,
        version: &VersionTag,
        with_checksum: bool,
    ) -> Result<ArchiveSource, BackendError> {
        let url = self.download_url(version);
        if !with_checksum {
            return Ok(ArchiveSource { url, sha256: None });
        }

        let filename = self.archive_file_name(version);
        let listing = http
            .get_json(&self.full_index_url())
            .await
            .map_err(|e| BackendError::network_request("checksum lookup", e))?;
        let releases = index::parse_releases(listing)
            .map_err(|e| BackendError::network_parse_from("checksum lookup", e))?;
        let sha256 = index::checksum_for(&releases, &filename).ok_or_else(|| {
            BackendError::validation(
                version.raw(),
                format!("no published checksum for {filename}"),
            )
        })?;
        debug!("Expecting sha256 {sha256} for {filename}");

        Ok(ArchiveSource {
            url,
            sha256: Some(sha256.to_string()),
        })
    }
}
