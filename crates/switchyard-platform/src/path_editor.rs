use std::fs::File;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use fs2::FileExt;
use log::{debug, info, warn};
use thiserror::Error;

use crate::env_store::{EnvStoreError, EnvironmentStore};

#[cfg(windows)]
pub const PATH_SEPARATOR: char = ';';
#[cfg(not(windows))]
pub const PATH_SEPARATOR: char = ':';

#[derive(Debug, Error)]
pub enum PathEditError {
    #[error(transparent)]
    Store(#[from] EnvStoreError),
    #[error("Failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PathEditError {
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::Store(error) => error.is_permission_denied(),
            Self::Lock { source, .. } => source.kind() == std::io::ErrorKind::PermissionDenied,
        }
    }
}

/// How a runtime's bin directory is recognised inside PATH.
///
/// Matching is a case-insensitive substring test on both tokens, so an
/// unrelated directory that happens to contain both (for example
/// `.cargo/bin` for `go`) also matches.
#[derive(Debug, Clone)]
pub struct PathSignature {
    runtime_token: String,
    bin_token: String,
    install_root: PathBuf,
}

impl PathSignature {
    #[must_use]
    pub fn new(
        runtime_token: impl Into<String>,
        bin_token: impl Into<String>,
        install_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runtime_token: runtime_token.into().to_lowercase(),
            bin_token: bin_token.into().to_lowercase(),
            install_root: install_root.into(),
        }
    }

    #[must_use]
    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    #[must_use]
    pub fn matches(&self, segment: &str) -> bool {
        let lower = segment.to_lowercase();
        lower.contains(&self.runtime_token) && lower.contains(&self.bin_token)
    }

    /// Version directory named by a matching segment.
    ///
    /// Under the install root this is the first component below it.
    /// Elsewhere it is the component following one named after the runtime,
    /// unless that component is the bin token itself.
    #[must_use]
    pub fn version_of(&self, segment: &str) -> Option<String> {
        let path = Path::new(segment);
        if let Ok(rest) = path.strip_prefix(&self.install_root) {
            return rest.components().next().and_then(normal_component);
        }

        let components: Vec<&str> = path
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect();
        components.windows(2).find_map(|pair| {
            let (name, next) = (pair[0], pair[1]);
            (name.eq_ignore_ascii_case(&self.runtime_token)
                && !next.eq_ignore_ascii_case(&self.bin_token)
                && !next.starts_with('.'))
            .then(|| next.to_string())
        })
    }
}

fn normal_component(component: Component<'_>) -> Option<String> {
    match component {
        Component::Normal(part) => {
            let part = part.to_str()?;
            (!part.is_empty() && !part.starts_with('.')).then(|| part.to_string())
        }
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathChange {
    Removed(String),
    Added(String),
}

/// Result of one PATH mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEdit {
    pub original: String,
    pub modified: String,
    pub changes: Vec<PathChange>,
}

impl PathEdit {
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.original != self.modified
    }

    #[must_use]
    pub fn summary(&self) -> String {
        if self.changes.is_empty() {
            return "PATH unchanged".to_string();
        }
        self.changes
            .iter()
            .map(|change| match change {
                PathChange::Removed(segment) => format!("- {segment}"),
                PathChange::Added(segment) => format!("+ {segment}"),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

struct EditGuard<'a> {
    _process: MutexGuard<'a, ()>,
    _file: Option<File>,
}

/// The only writer of the persisted PATH.
///
/// Clones share one in-process lock, so every runtime's edits are
/// serialized. An optional lock file extends that to other processes.
#[derive(Clone)]
pub struct PathEditor {
    store: Arc<dyn EnvironmentStore>,
    lock: Arc<Mutex<()>>,
    lock_file: Option<PathBuf>,
}

impl PathEditor {
    pub fn new(store: Arc<dyn EnvironmentStore>) -> Self {
        Self {
            store,
            lock: Arc::new(Mutex::new(())),
            lock_file: None,
        }
    }

    #[must_use]
    pub fn with_lock_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_file = Some(path.into());
        self
    }

    /// The persisted value, empty when unset.
    ///
    /// # Errors
    /// Returns the store's read error.
    pub fn current_value(&self) -> Result<String, PathEditError> {
        Ok(self.store.read_user_path()?.unwrap_or_default())
    }

    /// Version named by the first segment matching `signature`.
    ///
    /// # Errors
    /// Returns the store's read error.
    pub fn read_active(&self, signature: &PathSignature) -> Result<Option<String>, PathEditError> {
        let value = self.current_value()?;
        let active = split(&value)
            .find(|segment| signature.matches(segment))
            .and_then(|segment| signature.version_of(segment));
        debug!("Active entry for {}: {active:?}", signature.runtime_token);
        Ok(active)
    }

    /// Drop every segment matching `signature`.
    ///
    /// # Errors
    /// Returns an error if the lock cannot be taken or the store fails.
    pub fn remove_all(&self, signature: &PathSignature) -> Result<PathEdit, PathEditError> {
        let edit = {
            let _guard = self.lock()?;
            let original = self.current_value()?;
            let (kept, changes) = without_matches(&original, signature);
            let modified = join(&kept);
            if !changes.is_empty() {
                self.store.write_user_path(&modified)?;
            }
            PathEdit {
                original,
                modified,
                changes,
            }
        };
        self.notify();
        Ok(edit)
    }

    /// Replace every segment matching `signature` with `bin_dir`.
    ///
    /// # Errors
    /// Returns an error if the lock cannot be taken or the store fails.
    pub fn add(&self, signature: &PathSignature, bin_dir: &Path) -> Result<PathEdit, PathEditError> {
        let entry = bin_dir.to_string_lossy().into_owned();
        let edit = {
            let _guard = self.lock()?;
            let original = self.current_value()?;
            let (mut kept, mut changes) = without_matches(&original, signature);
            if !kept.contains(&entry.as_str()) {
                kept.push(&entry);
                changes.push(PathChange::Added(entry.clone()));
            }
            let modified = join(&kept);
            if modified != original {
                self.store.write_user_path(&modified)?;
            }
            PathEdit {
                original,
                modified,
                changes,
            }
        };
        info!("PATH now routes {} to {entry}", signature.runtime_token);
        self.notify();
        Ok(edit)
    }

    fn lock(&self) -> Result<EditGuard<'_>, PathEditError> {
        let process = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let file = match &self.lock_file {
            Some(path) => Some(lock_file(path)?),
            None => None,
        };
        Ok(EditGuard {
            _process: process,
            _file: file,
        })
    }

    fn notify(&self) {
        if let Err(error) = self.store.notify_environment_changed() {
            warn!("Environment change notification failed: {error}");
        }
    }
}

fn lock_file(path: &Path) -> Result<File, PathEditError> {
    let wrap = |source| PathEditError::Lock {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(wrap)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(wrap)?;
    file.lock_exclusive().map_err(wrap)?;
    Ok(file)
}

fn split(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(PATH_SEPARATOR)
        .filter(|segment| !segment.trim().is_empty())
}

fn join(segments: &[&str]) -> String {
    let mut separator = [0_u8; 4];
    segments.join(PATH_SEPARATOR.encode_utf8(&mut separator))
}

fn without_matches<'a>(
    value: &'a str,
    signature: &PathSignature,
) -> (Vec<&'a str>, Vec<PathChange>) {
    let mut kept = Vec::new();
    let mut changes = Vec::new();
    for segment in split(value) {
        if signature.matches(segment) {
            changes.push(PathChange::Removed(segment.to_string()));
        } else {
            kept.push(segment);
        }
    }
    (kept, changes)
}
