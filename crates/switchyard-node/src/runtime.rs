use std::path::PathBuf;

use async_trait::async_trait;
use log::debug;
use switchyard_backend::{BackendError, VersionTag};
use switchyard_core::checksum::parse_expected_checksum;
use switchyard_core::{
    ArchiveResolver, ArchiveSource, HostArch, HostOs, HostTarget, HttpClient, RuntimeLayout,
};

pub const DEFAULT_DIST_MIRROR: &str = "https://nodejs.org/dist";

/// Naming and download rules for Node.js distributions.
#[derive(Debug, Clone)]
pub struct NodeRuntime {
    target: HostTarget,
    mirror: String,
}

impl NodeRuntime {
    #[must_use]
    pub fn new(target: HostTarget) -> Self {
        Self {
            target,
            mirror: DEFAULT_DIST_MIRROR.to_string(),
        }
    }

    #[must_use]
    pub fn with_mirror(mut self, mirror: impl Into<String>) -> Self {
        self.mirror = mirror.into();
        self
    }

    fn mirror(&self) -> &str {
        self.mirror.trim_end_matches('/')
    }

    #[must_use]
    pub fn index_url(&self) -> String {
        format!("{}/index.json", self.mirror())
    }

    #[must_use]
    pub fn checksums_url(&self, version: &VersionTag) -> String {
        format!("{}/{}/SHASUMS256.txt", self.mirror(), version.raw())
    }

    #[must_use]
    pub fn download_url(&self, version: &VersionTag) -> String {
        format!(
            "{}/{}/{}",
            self.mirror(),
            version.raw(),
            self.archive_file_name(version)
        )
    }

    /// Platform suffix used in archive and directory names, e.g. `win-x64`.
    #[must_use]
    pub fn platform(&self) -> String {
        let os = match self.target.os {
            HostOs::Windows => "win",
            HostOs::Linux => "linux",
            HostOs::Macos => "darwin",
        };
        let arch = match self.target.arch {
            HostArch::X86_64 => "x64",
            HostArch::Aarch64 => "arm64",
            HostArch::X86 => "x86",
        };
        format!("{os}-{arch}")
    }

    fn distribution_dir(&self, version: &VersionTag) -> String {
        format!("node-{}-{}", version.raw(), self.platform())
    }
}

impl RuntimeLayout for NodeRuntime {
    fn name(&self) -> &'static str {
        "node"
    }

    fn archive_file_name(&self, version: &VersionTag) -> String {
        format!(
            "{}.{}",
            self.distribution_dir(version),
            self.target.archive_extension()
        )
    }

    /// Windows builds keep `node.exe` at the top of the distribution.
    fn bin_subdir(&self, version: &VersionTag) -> PathBuf {
        let dir = PathBuf::from(self.distribution_dir(version));
        if self.target.is_windows() {
            dir
        } else {
            dir.join("bin")
        }
    }

    fn bin_token(&self) -> String {
        self.platform()
    }
}

#[async_trait]
impl ArchiveResolver for NodeRuntime {
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
            .get_text(&self.checksums_url(version))
            .await
            .map_err(|e| BackendError::network_request("checksum lookup", e))?;
        let sha256 = parse_expected_checksum(&listing, &filename).ok_or_else(|| {
            BackendError::validation(
                version.raw(),
                format!("SHASUMS256.txt has no entry for {filename}"),
            )
        })?;
        debug!("Expecting sha256 {sha256} for {filename}");

        Ok(ArchiveSource {
            url,
            sha256: Some(sha256),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(raw: &str) -> VersionTag {
        VersionTag::new(raw).expect("valid tag")
    }

    #[test]
    fn windows_layout_has_no_bin_subdirectory() {
        let runtime = NodeRuntime::new(HostTarget::new(HostOs::Windows, HostArch::X86_64));
        let version = tag("v20.11.1");

        assert_eq!(
            runtime.archive_file_name(&version),
            "node-v20.11.1-win-x64.zip"
        );
        assert_eq!(
            runtime.bin_subdir(&version),
            PathBuf::from("node-v20.11.1-win-x64")
        );
        assert_eq!(runtime.bin_token(), "win-x64");
    }

    #[test]
    fn unix_layout_uses_tarball_and_bin() {
        let runtime = NodeRuntime::new(HostTarget::new(HostOs::Macos, HostArch::Aarch64));
        let version = tag("v22.1.0");

        assert_eq!(
            runtime.archive_file_name(&version),
            "node-v22.1.0-darwin-arm64.tar.gz"
        );
        assert_eq!(
            runtime.bin_subdir(&version),
            PathBuf::from("node-v22.1.0-darwin-arm64").join("bin")
        );
    }

    #[test]
    fn urls_respect_custom_mirror() {
        let runtime = NodeRuntime::new(HostTarget::new(HostOs::Linux, HostArch::X86_64))
            .with_mirror("https://npmmirror.com/mirrors/node/");
        let version = tag("v20.11.1");

        assert_eq!(
            runtime.index_url(),
            "https://npmmirror.com/mirrors/node/index.json"
        );
        assert_eq!(
            runtime.download_url(&version),
            "https://npmmirror.com/mirrors/node/v20.11.1/node-v20.11.1-linux-x64.tar.gz"
        );
        assert_eq!(
            runtime.checksums_url(&version),
            "https://npmmirror.com/mirrors/node/v20.11.1/SHASUMS256.txt"
        );
    }
}
