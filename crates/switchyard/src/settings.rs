use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use switchyard_platform::AppPaths;
use thiserror::Error;

/// The settings file exists but cannot be used.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Ignoring invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    /// Overrides `<data_dir>/packages` as the root of every install tree.
    #[serde(default)]
    pub packages_dir: Option<PathBuf>,

    #[serde(default)]
    pub node_dist_mirror: Option<String>,

    #[serde(default)]
    pub go_download_base: Option<String>,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_http_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub verify_checksums: bool,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,

    #[serde(default = "default_retry_delays")]
    pub retry_delays_secs: Vec<u64>,
}

fn default_true() -> bool {
    true
}

fn default_http_timeout() -> u64 {
    10
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_retry_delays() -> Vec<u64> {
    vec![0, 2, 5]
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            packages_dir: None,
            node_dist_mirror: None,
            go_download_base: None,
            http_timeout_secs: default_http_timeout(),
            connect_timeout_secs: default_http_timeout(),
            verify_checksums: default_true(),
            debug_logging: false,
            max_log_size_bytes: default_max_log_size_bytes(),
            retry_delays_secs: default_retry_delays(),
        }
    }
}

impl AppSettings {
    pub fn load(paths: &AppPaths) -> Result<Self, SettingsError> {
        Self::load_from(&paths.settings_file())
    }

    /// A missing file yields the defaults. Callers decide what to do with an
    /// unreadable or malformed one; logging is not up yet when this runs.
    pub fn load_from(settings_path: &Path) -> Result<Self, SettingsError> {
        if !settings_path.exists() {
            return Ok(Self::default());
        }
        let content =
            std::fs::read_to_string(settings_path).map_err(|source| SettingsError::Read {
                path: settings_path.to_path_buf(),
                source,
            })?;
        serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: settings_path.to_path_buf(),
            source,
        })
    }

    #[cfg(test)]
    pub fn save(&self, paths: &AppPaths) -> Result<(), std::io::Error> {
        paths.ensure_dirs()?;

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.settings_file(), content)?;
        Ok(())
    }

    pub fn packages_dir(&self, paths: &AppPaths) -> PathBuf {
        self.packages_dir
            .clone()
            .unwrap_or_else(|| paths.packages_dir())
    }

    /// An empty list still allows the first attempt.
    pub fn retry_delays(&self) -> Vec<u64> {
        if self.retry_delays_secs.is_empty() {
            vec![0]
        } else {
            self.retry_delays_secs.clone()
        }
    }
}

/// Settings for this run plus a warning to emit once logging is initialized.
pub fn startup_settings(paths: &AppPaths) -> (AppSettings, Option<String>) {
    match AppSettings::load(paths) {
        Ok(settings) => (settings, None),
        Err(error) => (AppSettings::default(), Some(format!("{error}; using defaults"))),
    }
}
