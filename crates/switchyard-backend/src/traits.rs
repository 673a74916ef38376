use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::Path;
use tokio::sync::mpsc;

use crate::error::BackendError;
use crate::types::{InstallProgress, InstalledVersion, RemoteVersion, VersionTag};

/// Uniform contract every managed runtime implements.
///
/// Versions are accepted as strings in either raw or display form; an
/// annotation such as `(LTS: Iron)` is stripped before the version is used.
#[async_trait]
pub trait VersionManager: Send + Sync + VersionManagerClone {
    fn name(&self) -> &'static str;

    fn display_name(&self) -> &'static str {
        self.name()
    }

    fn install_root(&self) -> &Path;

    async fn list_remote(&self) -> Result<Vec<RemoteVersion>, BackendError>;

    async fn list_installed(&self) -> Result<Vec<InstalledVersion>, BackendError>;

    async fn current_version(&self) -> Result<Option<VersionTag>, BackendError>;

    async fn install_with_progress(
        &self,
        version: &str,
        progress: Option<mpsc::Sender<InstallProgress>>,
    ) -> Result<String, BackendError>;

    async fn uninstall(&self, version: &str) -> Result<String, BackendError>;

    async fn use_version(&self, version: &str) -> Result<String, BackendError>;

    /// There is one notion of default and it is the active version.
    async fn set_default(&self, version: &str) -> Result<String, BackendError> {
        self.use_version(version).await
    }

    async fn install(&self, version: &str) -> Result<String, BackendError> {
        self.install_with_progress(version, None).await
    }

    /// Remote tags in published order, display annotations included.
    async fn available_versions(&self) -> Result<Vec<VersionTag>, BackendError> {
        Ok(self
            .list_remote()
            .await?
            .into_iter()
            .map(|remote| remote.version)
            .collect())
    }

    async fn installed_versions(&self) -> Result<BTreeSet<VersionTag>, BackendError> {
        Ok(self
            .list_installed()
            .await?
            .into_iter()
            .map(|installed| installed.version)
            .collect())
    }

    async fn list_remote_lts(&self) -> Result<Vec<RemoteVersion>, BackendError> {
        let all = self.list_remote().await?;
        Ok(all
            .into_iter()
            .filter(|v| v.lts_codename.is_some())
            .collect())
    }
}

pub trait VersionManagerClone: Send + Sync {
    fn clone_box(&self) -> Box<dyn VersionManager>;
}

impl<T> VersionManagerClone for T
where
    T: 'static + VersionManager + Clone,
{
    fn clone_box(&self) -> Box<dyn VersionManager> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn VersionManager> {
    fn clone(&self) -> Box<dyn VersionManager> {
        self.clone_box()
    }
}

impl<T: VersionManager + Clone + 'static> From<T> for Box<dyn VersionManager> {
    fn from(manager: T) -> Self {
        Box::new(manager)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;

    #[derive(Clone)]
    struct MockManager {
        root: PathBuf,
        remote: Vec<RemoteVersion>,
        used: Arc<Mutex<Vec<String>>>,
    }

    impl MockManager {
        fn new(remote: Vec<RemoteVersion>) -> Self {
            Self {
                root: PathBuf::from("/tmp/mock-packages/mock"),
                remote,
                used: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl VersionManager for MockManager {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn install_root(&self) -> &Path {
            &self.root
        }

        async fn list_remote(&self) -> Result<Vec<RemoteVersion>, BackendError> {
            Ok(self.remote.clone())
        }

        async fn list_installed(&self) -> Result<Vec<InstalledVersion>, BackendError> {
            Ok(vec![InstalledVersion {
                version: VersionTag::new("v1.0.0").expect("valid tag"),
                is_active: false,
                install_date: None,
                disk_size: None,
            }])
        }

        async fn current_version(&self) -> Result<Option<VersionTag>, BackendError> {
            Ok(None)
        }

        async fn install_with_progress(
            &self,
            version: &str,
            _progress: Option<mpsc::Sender<InstallProgress>>,
        ) -> Result<String, BackendError> {
            Ok(format!("installed {version}"))
        }

        async fn uninstall(&self, version: &str) -> Result<String, BackendError> {
            Err(BackendError::not_found(version))
        }

        async fn use_version(&self, version: &str) -> Result<String, BackendError> {
            self.used
                .lock()
                .expect("mock lock poisoned")
                .push(version.to_string());
            Ok(format!("using {version}"))
        }
    }

    fn remote(version: &str, lts_codename: Option<&str>) -> RemoteVersion {
        let mut tag = VersionTag::new(version).expect("valid tag in test");
        if let Some(codename) = lts_codename {
            tag = tag.with_annotation(format!("LTS: {codename}"));
        }
        RemoteVersion {
            version: tag,
            lts_codename: lts_codename.map(str::to_string),
            release_date: None,
            stable: true,
        }
    }

    #[tokio::test]
    async fn set_default_is_alias_of_use_version() {
        let manager = MockManager::new(Vec::new());

        let message = manager.set_default("v1.0.0").await.expect("alias works");

        assert_eq!(message, "using v1.0.0");
        assert_eq!(
            *manager.used.lock().expect("mock lock poisoned"),
            vec!["v1.0.0".to_string()]
        );
    }

    #[tokio::test]
    async fn install_delegates_without_progress() {
        let manager = MockManager::new(Vec::new());

        let message = manager.install("v2.0.0").await.expect("install works");

        assert_eq!(message, "installed v2.0.0");
    }

    #[tokio::test]
    async fn available_versions_preserve_remote_order() {
        let manager = MockManager::new(vec![
            remote("v24.0.0", None),
            remote("v22.1.0", Some("Jod")),
            remote("v20.10.0", Some("Iron")),
        ]);

        let tags = manager
            .available_versions()
            .await
            .expect("listing succeeds");

        let displayed: Vec<String> = tags.iter().map(VersionTag::display).collect();
        assert_eq!(
            displayed,
            vec!["v24.0.0", "v22.1.0 (LTS: Jod)", "v20.10.0 (LTS: Iron)"]
        );
    }

    #[tokio::test]
    async fn list_remote_lts_filters_non_lts_versions() {
        let manager = MockManager::new(vec![
            remote("v24.0.0", None),
            remote("v22.1.0", Some("Jod")),
            remote("v20.10.0", Some("Iron")),
        ]);

        let lts = manager.list_remote_lts().await.expect("lts listing succeeds");

        assert_eq!(lts.len(), 2);
        assert_eq!(lts[0].version.raw(), "v22.1.0");
        assert_eq!(lts[1].version.raw(), "v20.10.0");
    }

    #[tokio::test]
    async fn installed_versions_collects_tags() {
        let manager = MockManager::new(Vec::new());

        let installed = manager
            .installed_versions()
            .await
            .expect("listing succeeds");

        assert!(installed.contains(&VersionTag::new("v1.0.0").expect("valid tag")));
    }

    #[tokio::test]
    async fn boxed_clone_preserves_manager_behavior() {
        let boxed: Box<dyn VersionManager> = MockManager::new(vec![remote("v20.1.0", None)]).into();
        let cloned = boxed.clone();

        assert_eq!(cloned.name(), "mock");
        assert_eq!(cloned.display_name(), "mock");
        assert_eq!(cloned.install_root(), Path::new("/tmp/mock-packages/mock"));
        let remote_versions = cloned
            .list_remote()
            .await
            .expect("list_remote should work on cloned manager");
        assert_eq!(remote_versions.len(), 1);
    }
}
