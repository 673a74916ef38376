use serde::Deserialize;
use switchyard_backend::{RemoteVersion, VersionTag};

/// One record of the Node.js distribution `index.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeRelease {
    pub version: String,
    #[serde(default)]
    pub date: Option<String>,
    /// `false`, or the release line's codename.
    #[serde(default)]
    pub lts: serde_json::Value,
    #[serde(default)]
    pub files: Vec<String>,
}

impl NodeRelease {
    #[must_use]
    pub fn lts_codename(&self) -> Option<&str> {
        self.lts.as_str().filter(|name| !name.is_empty())
    }
}

/// # Errors
/// Returns the deserialization error when the document is not a list of
/// release records.
pub fn parse_releases(value: serde_json::Value) -> Result<Vec<NodeRelease>, serde_json::Error> {
    serde_json::from_value(value)
}

/// Published order is kept; LTS lines carry an `LTS: <codename>` annotation.
#[must_use]
pub fn remote_versions(releases: &[NodeRelease]) -> Vec<RemoteVersion> {
    releases
        .iter()
        .filter_map(|release| {
            let mut version = VersionTag::new(release.version.as_str()).ok()?;
            let codename = release.lts_codename().map(str::to_string);
            if let Some(name) = &codename {
                version = version.with_annotation(format!("LTS: {name}"));
            }
            Some(RemoteVersion {
                version,
                lts_codename: codename,
                release_date: release.date.clone(),
                stable: true,
            })
        })
        .collect()
}
