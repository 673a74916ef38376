use std::collections::BTreeMap;

use log::debug;

use crate::error::BackendError;
use crate::traits::VersionManager;

/// Collects managers at start-up. The built [`RuntimeRegistry`] is immutable.
#[derive(Default)]
pub struct RegistryBuilder {
    managers: BTreeMap<&'static str, Box<dyn VersionManager>>,
}

impl RegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a manager under its own name.
    ///
    /// # Errors
    /// Returns an error when a manager with the same name is already
    /// registered.
    pub fn register(
        mut self,
        manager: impl Into<Box<dyn VersionManager>>,
    ) -> Result<Self, BackendError> {
        let manager = manager.into();
        let name = manager.name();
        if self.managers.contains_key(name) {
            return Err(BackendError::DuplicateRuntime {
                name: name.to_string(),
            });
        }
        debug!("Registering runtime {name}");
        self.managers.insert(name, manager);
        Ok(self)
    }

    #[must_use]
    pub fn build(self) -> RuntimeRegistry {
        RuntimeRegistry {
            managers: self.managers,
        }
    }
}

pub struct RuntimeRegistry {
    managers: BTreeMap<&'static str, Box<dyn VersionManager>>,
}

impl RuntimeRegistry {
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Look up a manager by runtime name (case-insensitive).
    ///
    /// # Errors
    /// Returns [`BackendError::UnknownRuntime`] when no manager is registered
    /// under `name`.
    pub fn get(&self, name: &str) -> Result<&dyn VersionManager, BackendError> {
        let wanted = name.trim().to_ascii_lowercase();
        self.managers
            .get(wanted.as_str())
            .map(|manager| manager.as_ref())
            .ok_or_else(|| BackendError::UnknownRuntime {
                name: name.to_string(),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.managers.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn VersionManager> + '_ {
        self.managers.values().map(|manager| manager.as_ref())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.managers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::types::{InstallProgress, InstalledVersion, RemoteVersion, VersionTag};

    #[derive(Clone)]
    struct NamedManager {
        name: &'static str,
        root: PathBuf,
    }

    impl NamedManager {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                root: PathBuf::from("/tmp/packages").join(name),
            }
        }
    }

    #[async_trait]
    impl VersionManager for NamedManager {
        fn name(&self) -> &'static str {
            self.name
        }

        fn install_root(&self) -> &Path {
            &self.root
        }

        async fn list_remote(&self) -> Result<Vec<RemoteVersion>, BackendError> {
            Ok(Vec::new())
        }

        async fn list_installed(&self) -> Result<Vec<InstalledVersion>, BackendError> {
            Ok(Vec::new())
        }

        async fn current_version(&self) -> Result<Option<VersionTag>, BackendError> {
            Ok(None)
        }

        async fn install_with_progress(
            &self,
            version: &str,
            _progress: Option<mpsc::Sender<InstallProgress>>,
        ) -> Result<String, BackendError> {
            Ok(format!("{} {version}", self.name))
        }

        async fn uninstall(&self, version: &str) -> Result<String, BackendError> {
            Err(BackendError::not_found(version))
        }

        async fn use_version(&self, version: &str) -> Result<String, BackendError> {
            Err(BackendError::not_found(version))
        }
    }

    fn registry() -> RuntimeRegistry {
        RuntimeRegistry::builder()
            .register(NamedManager::new("node"))
            .and_then(|builder| builder.register(NamedManager::new("go")))
            .expect("distinct runtimes register")
            .build()
    }

    #[tokio::test]
    async fn dispatches_by_runtime_name() {
        let registry = registry();

        let go = registry.get("go").expect("go is registered");
        let message = go.install("go1.22.3").await.expect("stub install");

        assert_eq!(message, "go go1.22.3");
        assert_eq!(registry.get("NODE").expect("case-insensitive").name(), "node");
    }

    #[test]
    fn unknown_runtime_is_not_found() {
        let registry = registry();

        let result = registry.get("ruby");

        assert!(matches!(
            result,
            Err(BackendError::UnknownRuntime { ref name }) if name == "ruby"
        ));
    }

    #[test]
    fn names_are_sorted() {
        let registry = registry();

        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["go", "node"]);
        assert_eq!(registry.len(), 2);
        assert!(!registry.is_empty());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let result = RuntimeRegistry::builder()
            .register(NamedManager::new("go"))
            .and_then(|builder| builder.register(NamedManager::new("go")));

        assert!(result.is_err());
    }
}
