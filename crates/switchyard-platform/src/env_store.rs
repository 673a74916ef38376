use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use log::debug;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvStoreError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("Permission denied during {operation}: {details}")]
    PermissionDenied {
        operation: &'static str,
        details: String,
    },
    #[error("Registry call {operation} failed with status {status}")]
    Registry { operation: &'static str, status: u32 },
    #[error("Environment change notification failed: {0}")]
    Notification(String),
}

impl EnvStoreError {
    fn io(context: &'static str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            Self::PermissionDenied {
                operation: context,
                details: source.to_string(),
            }
        } else {
            Self::Io { context, source }
        }
    }

    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }
}

/// Persisted, user-scoped PATH value.
pub trait EnvironmentStore: Send + Sync {
    /// `Ok(None)` when the variable has never been set.
    fn read_user_path(&self) -> Result<Option<String>, EnvStoreError>;

    fn write_user_path(&self, value: &str) -> Result<(), EnvStoreError>;

    /// Tell running processes that the environment changed.
    fn notify_environment_changed(&self) -> Result<(), EnvStoreError>;
}

/// Keeps the managed PATH in a plain file, for platforms without a
/// persistent user environment.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EnvironmentStore for FileStore {
    fn read_user_path(&self) -> Result<Option<String>, EnvStoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content.trim_end_matches(['\r', '\n']).to_string())),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(EnvStoreError::io("read managed PATH", error)),
        }
    }

    fn write_user_path(&self, value: &str) -> Result<(), EnvStoreError> {
        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)
            .map_err(|error| EnvStoreError::io("create managed PATH directory", error))?;

        let mut temp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|error| EnvStoreError::io("create temporary PATH file", error))?;
        writeln!(temp, "{value}")
            .map_err(|error| EnvStoreError::io("write temporary PATH file", error))?;
        temp.persist(&self.path)
            .map_err(|error| EnvStoreError::io("replace managed PATH", error.error))?;
        Ok(())
    }

    fn notify_environment_changed(&self) -> Result<(), EnvStoreError> {
        debug!(
            "Managed PATH updated in {}; new shells pick it up via `switchyard env`",
            self.path.display()
        );
        Ok(())
    }
}

/// In-process store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    value: Mutex<Option<String>>,
    writes: AtomicUsize,
    notifications: AtomicUsize,
    fail_notifications: AtomicBool,
    deny_writes: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_value(value: impl Into<String>) -> Self {
        let store = Self::default();
        *store.value.lock().unwrap_or_else(PoisonError::into_inner) = Some(value.into());
        store
    }

    #[must_use]
    pub fn value(&self) -> Option<String> {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn notification_count(&self) -> usize {
        self.notifications.load(Ordering::SeqCst)
    }

    pub fn set_fail_notifications(&self, fail: bool) {
        self.fail_notifications.store(fail, Ordering::SeqCst);
    }

    pub fn set_deny_writes(&self, deny: bool) {
        self.deny_writes.store(deny, Ordering::SeqCst);
    }
}

impl EnvironmentStore for MemoryStore {
    fn read_user_path(&self) -> Result<Option<String>, EnvStoreError> {
        Ok(self.value())
    }

    fn write_user_path(&self, value: &str) -> Result<(), EnvStoreError> {
        if self.deny_writes.load(Ordering::SeqCst) {
            return Err(EnvStoreError::PermissionDenied {
                operation: "write PATH",
                details: "store is read-only".to_string(),
            });
        }
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = Some(value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn notify_environment_changed(&self) -> Result<(), EnvStoreError> {
        self.notifications.fetch_add(1, Ordering::SeqCst);
        if self.fail_notifications.load(Ordering::SeqCst) {
            return Err(EnvStoreError::Notification("broadcast timed out".to_string()));
        }
        Ok(())
    }
}

#[cfg(windows)]
pub use registry::RegistryStore;

#[cfg(windows)]
mod registry {
    use windows_sys::Win32::Foundation::{ERROR_ACCESS_DENIED, ERROR_FILE_NOT_FOUND};
    use windows_sys::Win32::System::Registry::{
        HKEY, HKEY_CURRENT_USER, KEY_QUERY_VALUE, KEY_SET_VALUE, REG_EXPAND_SZ, RegCloseKey,
        RegOpenKeyExW, RegQueryValueExW, RegSetValueExW,
    };
    use windows_sys::Win32::UI::WindowsAndMessaging::{
        HWND_BROADCAST, SMTO_ABORTIFHUNG, SendMessageTimeoutW, WM_SETTINGCHANGE,
    };

    use super::{EnvStoreError, EnvironmentStore};

    const NOTIFY_TIMEOUT_MS: u32 = 5000;

    fn wide(value: &str) -> Vec<u16> {
        value.encode_utf16().chain(std::iter::once(0)).collect()
    }

    fn status_error(operation: &'static str, status: u32) -> EnvStoreError {
        if status == ERROR_ACCESS_DENIED {
            EnvStoreError::PermissionDenied {
                operation,
                details: format!("registry status {status}"),
            }
        } else {
            EnvStoreError::Registry { operation, status }
        }
    }

    struct OpenKey(HKEY);

    impl OpenKey {
        fn open(access: u32) -> Result<Option<Self>, EnvStoreError> {
            let subkey = wide("Environment");
            unsafe {
                let mut hkey: HKEY = std::mem::zeroed();
                let status = RegOpenKeyExW(HKEY_CURRENT_USER, subkey.as_ptr(), 0, access, &mut hkey);
                match status {
                    0 => Ok(Some(Self(hkey))),
                    ERROR_FILE_NOT_FOUND => Ok(None),
                    status => Err(status_error("RegOpenKeyExW", status)),
                }
            }
        }
    }

    impl Drop for OpenKey {
        fn drop(&mut self) {
            unsafe {
                RegCloseKey(self.0);
            }
        }
    }

    /// `HKCU\Environment\Path`, the per-user PATH on Windows.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct RegistryStore;

    impl RegistryStore {
        #[must_use]
        pub fn new() -> Self {
            Self
        }
    }

    impl EnvironmentStore for RegistryStore {
        fn read_user_path(&self) -> Result<Option<String>, EnvStoreError> {
            let Some(key) = OpenKey::open(KEY_QUERY_VALUE)? else {
                return Ok(None);
            };
            let name = wide("Path");
            unsafe {
                let mut size: u32 = 0;
                let status = RegQueryValueExW(
                    key.0,
                    name.as_ptr(),
                    std::ptr::null(),
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                    &mut size,
                );
                if status == ERROR_FILE_NOT_FOUND {
                    return Ok(None);
                }
                if status != 0 {
                    return Err(status_error("RegQueryValueExW", status));
                }

                let mut buffer = vec![0_u16; (size as usize).div_ceil(2)];
                let status = RegQueryValueExW(
                    key.0,
                    name.as_ptr(),
                    std::ptr::null(),
                    std::ptr::null_mut(),
                    buffer.as_mut_ptr().cast::<u8>(),
                    &mut size,
                );
                if status != 0 {
                    return Err(status_error("RegQueryValueExW", status));
                }
                let len = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
                Ok(Some(String::from_utf16_lossy(&buffer[..len])))
            }
        }

        fn write_user_path(&self, value: &str) -> Result<(), EnvStoreError> {
            let Some(key) = OpenKey::open(KEY_SET_VALUE)? else {
                return Err(status_error("RegOpenKeyExW", ERROR_FILE_NOT_FOUND));
            };
            let name = wide("Path");
            let data = wide(value);
            let byte_len = u32::try_from(data.len() * 2).map_err(|_| EnvStoreError::Registry {
                operation: "RegSetValueExW",
                status: 0,
            })?;
            let status = unsafe {
                RegSetValueExW(
                    key.0,
                    name.as_ptr(),
                    0,
                    REG_EXPAND_SZ,
                    data.as_ptr().cast::<u8>(),
                    byte_len,
                )
            };
            if status != 0 {
                return Err(status_error("RegSetValueExW", status));
            }
            Ok(())
        }

        fn notify_environment_changed(&self) -> Result<(), EnvStoreError> {
            let area = wide("Environment");
            let mut result: usize = 0;
            let sent = unsafe {
                SendMessageTimeoutW(
                    HWND_BROADCAST,
                    WM_SETTINGCHANGE,
                    0,
                    area.as_ptr() as isize,
                    SMTO_ABORTIFHUNG,
                    NOTIFY_TIMEOUT_MS,
                    &mut result,
                )
            };
            if sent == 0 {
                return Err(EnvStoreError::Notification(
                    "WM_SETTINGCHANGE broadcast failed or timed out".to_string(),
                ));
            }
            Ok(())
        }
    }
}
