use serde::Deserialize;
use switchyard_backend::{RemoteVersion, VersionTag};

/// One entry of the `go.dev/dl/?mode=json` listing.
#[derive(Debug, Clone, Deserialize)]
pub struct GoRelease {
    pub version: String,
    #[serde(default)]
    pub stable: bool,
    #[serde(default)]
    pub files: Vec<GoFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoFile {
    pub filename: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub sha256: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub kind: String,
}

/// Parse the release listing.
///
/// # Errors
/// Returns the deserialization error when the document is not a list of
/// release records.
pub fn parse_releases(value: serde_json::Value) -> Result<Vec<GoRelease>, serde_json::Error> {
    serde_json::from_value(value)
}

/// Listing order is kept. Records with unusable tags are skipped.
#[must_use]
pub fn remote_versions(releases: &[GoRelease]) -> Vec<RemoteVersion> {
    releases
        .iter()
        .filter_map(|release| {
            let version = VersionTag::new(release.version.as_str()).ok()?;
            Some(RemoteVersion {
                version,
                lts_codename: None,
                release_date: None,
                stable: release.stable,
            })
        })
        .collect()
}

/// Published SHA-256 of `filename`, if listed.
#[must_use]
pub fn checksum_for<'a>(releases: &'a [GoRelease], filename: &str) -> Option<&'a str> {
    releases
        .iter()
        .flat_map(|release| release.files.iter())
        .find(|file| file.filename == filename && !file.sha256.is_empty())
        .map(|file| file.sha256.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> serde_json::Value {
        serde_json::json!([
            {
                "version": "go1.22.3",
                "stable": true,
                "files": [
                    {
                        "filename": "go1.22.3.src.tar.gz",
                        "os": "",
                        "arch": "",
                        "version": "go1.22.3",
                        "sha256": "aaaa",
                        "size": 27000000,
                        "kind": "source"
                    },
                    {
                        "filename": "go1.22.3.linux-amd64.tar.gz",
                        "os": "linux",
                        "arch": "amd64",
                        "version": "go1.22.3",
                        "sha256": "bbbb",
                        "size": 68000000,
                        "kind": "archive"
                    }
                ]
            },
            { "version": "go1.23rc1", "stable": false, "files": [] },
            { "version": "bad/tag", "stable": true }
        ])
    }

    #[test]
    fn remote_versions_keep_order_and_skip_bad_tags() {
        let releases = parse_releases(sample()).expect("sample parses");

        let remote = remote_versions(&releases);

        let tags: Vec<(&str, bool)> = remote
            .iter()
            .map(|r| (r.version.raw(), r.stable))
            .collect();
        assert_eq!(tags, vec![("go1.22.3", true), ("go1.23rc1", false)]);
        assert!(remote.iter().all(|r| r.lts_codename.is_none()));
    }

    #[test]
    fn checksum_lookup_matches_exact_filename() {
        let releases = parse_releases(sample()).expect("sample parses");

        assert_eq!(
            checksum_for(&releases, "go1.22.3.linux-amd64.tar.gz"),
            Some("bbbb")
        );
        assert_eq!(checksum_for(&releases, "go1.22.3.windows-amd64.zip"), None);
    }

    #[test]
    fn non_list_document_is_rejected() {
        assert!(parse_releases(serde_json::json!({"error": "rate limited"})).is_err());
    }
}
