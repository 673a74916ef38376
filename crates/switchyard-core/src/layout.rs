use std::path::{Path, PathBuf};

use log::debug;
use switchyard_backend::VersionTag;

/// Per-runtime naming rules. Implementations are pure.
pub trait RuntimeLayout: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// File name of the release archive; always contains the raw version.
    fn archive_file_name(&self, version: &VersionTag) -> String;

    /// Bin directory relative to the version's extract directory.
    fn bin_subdir(&self, version: &VersionTag) -> PathBuf;

    /// Second token a PATH segment must contain to belong to this runtime.
    fn bin_token(&self) -> String;

    /// Extra filter on directory names under the install root.
    fn is_version_dir(&self, _name: &str) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    pub download_path: PathBuf,
    pub extract_dir: PathBuf,
    pub bin_dir: PathBuf,
}

#[must_use]
pub fn layout<R: RuntimeLayout + ?Sized>(
    runtime: &R,
    install_root: &Path,
    version: &VersionTag,
) -> InstallLayout {
    let extract_dir = install_root.join(version.raw());
    InstallLayout {
        download_path: install_root.join(runtime.archive_file_name(version)),
        bin_dir: extract_dir.join(runtime.bin_subdir(version)),
        extract_dir,
    }
}

/// A version counts as installed once its directory exists and has content.
#[must_use]
pub fn is_installed(extract_dir: &Path) -> bool {
    std::fs::read_dir(extract_dir).is_ok_and(|mut entries| entries.next().is_some())
}

/// Installed version directories, sorted by raw tag.
///
/// Hidden entries (staging directories), plain files (downloads) and empty
/// directories are skipped. A missing root yields an empty list.
///
/// # Errors
/// Returns an error if the root exists but cannot be read.
pub fn installed_dirs<R: RuntimeLayout + ?Sized>(
    runtime: &R,
    install_root: &Path,
) -> std::io::Result<Vec<(VersionTag, PathBuf)>> {
    let entries = match std::fs::read_dir(install_root) {
        Ok(entries) => entries,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => return Err(error),
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name.starts_with('.') || !runtime.is_version_dir(&name) {
            continue;
        }
        let path = entry.path();
        if !entry.file_type()?.is_dir() || !is_installed(&path) {
            continue;
        }
        match VersionTag::new(&name) {
            Ok(tag) => found.push((tag, path)),
            Err(error) => debug!("Ignoring {}: {error}", path.display()),
        }
    }
    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found)
}

/// Total size of regular files below `path`. Unreadable entries count as
/// zero.
#[must_use]
pub fn disk_size(path: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(path) else {
        return 0;
    };
    entries
        .filter_map(Result::ok)
        .map(|entry| match entry.file_type() {
            Ok(kind) if kind.is_dir() => disk_size(&entry.path()),
            Ok(kind) if kind.is_file() => entry.metadata().map_or(0, |meta| meta.len()),
            _ => 0,
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;

    impl RuntimeLayout for Plain {
        fn name(&self) -> &'static str {
            "plain"
        }

        fn archive_file_name(&self, version: &VersionTag) -> String {
            format!("plain-{}.zip", version.raw())
        }

        fn bin_subdir(&self, _version: &VersionTag) -> PathBuf {
            PathBuf::from("bin")
        }

        fn bin_token(&self) -> String {
            "bin".to_string()
        }

        fn is_version_dir(&self, name: &str) -> bool {
            !name.starts_with("tmp")
        }
    }

    fn tag(raw: &str) -> VersionTag {
        VersionTag::new(raw).expect("valid tag")
    }

    #[test]
    fn layout_uses_raw_tag_never_annotation() {
        let version = tag("1.0.0").with_annotation("LTS: Iron");
        let root = Path::new("/packages/plain");

        let layout = layout(&Plain, root, &version);

        assert_eq!(layout.download_path, root.join("plain-1.0.0.zip"));
        assert_eq!(layout.extract_dir, root.join("1.0.0"));
        assert_eq!(layout.bin_dir, root.join("1.0.0").join("bin"));
    }

    #[test]
    fn listing_skips_hidden_files_empty_and_filtered_dirs() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let root = temp.path();
        for dir in ["2.0.0", "1.0.0", ".staging-abc", "tmp-x"] {
            std::fs::create_dir_all(root.join(dir).join("bin")).expect("dir created");
        }
        std::fs::create_dir_all(root.join("3.0.0")).expect("empty dir created");
        std::fs::write(root.join("plain-4.0.0.zip"), b"partial").expect("file written");

        let found: Vec<String> = installed_dirs(&Plain, root)
            .expect("listing works")
            .into_iter()
            .map(|(tag, _)| tag.raw().to_string())
            .collect();

        assert_eq!(found, vec!["1.0.0", "2.0.0"]);
    }

    #[test]
    fn missing_root_lists_nothing() {
        let temp = tempfile::tempdir().expect("tempdir should be created");

        let found = installed_dirs(&Plain, &temp.path().join("absent")).expect("listing works");

        assert!(found.is_empty());
    }

    #[test]
    fn disk_size_sums_nested_files() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        std::fs::create_dir_all(temp.path().join("a/b")).expect("dirs created");
        std::fs::write(temp.path().join("a/one"), [0_u8; 10]).expect("file written");
        std::fs::write(temp.path().join("a/b/two"), [0_u8; 5]).expect("file written");

        assert_eq!(disk_size(temp.path()), 15);
        assert!(!is_installed(&temp.path().join("missing")));
        assert!(is_installed(temp.path()));
    }
}
