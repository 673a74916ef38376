use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use switchyard_backend::{BackendError, RuntimeRegistry};
use switchyard_core::{HostTarget, HttpClient, HttpOptions, ReqwestClient};
use switchyard_go::{GoBackend, GoRuntime};
use switchyard_node::{NodeBackend, NodeRuntime};
use switchyard_platform::{AppPaths, EnvironmentStore, PathEditor};

use crate::error::CliError;
use crate::settings::AppSettings;

/// Everything a command needs: the managers plus the PATH editor they share.
pub struct Runtimes {
    pub registry: RuntimeRegistry,
    pub path_editor: PathEditor,
}

impl Runtimes {
    pub fn for_host(settings: &AppSettings, paths: &AppPaths) -> Result<Self, CliError> {
        let target = HostTarget::current().ok_or_else(|| {
            CliError::UnsupportedHost(format!(
                "{}-{}",
                std::env::consts::OS,
                std::env::consts::ARCH
            ))
        })?;
        let http = ReqwestClient::new(HttpOptions {
            read_timeout: Duration::from_secs(settings.http_timeout_secs),
            connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
        })?;
        let path_editor =
            PathEditor::new(environment_store(paths)).with_lock_file(paths.path_lock_file());

        let registry = build_registry(
            settings,
            &settings.packages_dir(paths),
            target,
            Arc::new(http),
            &path_editor,
        )?;
        Ok(Self {
            registry,
            path_editor,
        })
    }
}

#[cfg(windows)]
fn environment_store(_paths: &AppPaths) -> Arc<dyn EnvironmentStore> {
    Arc::new(switchyard_platform::RegistryStore::new())
}

#[cfg(not(windows))]
fn environment_store(paths: &AppPaths) -> Arc<dyn EnvironmentStore> {
    Arc::new(switchyard_platform::FileStore::new(paths.path_store_file()))
}

/// Go mirrors publish their JSON listing next to the archives.
fn go_runtime(target: HostTarget, download_base: Option<&str>) -> GoRuntime {
    let runtime = GoRuntime::new(target);
    match download_base {
        Some(base) => {
            let base = base.trim_end_matches('/');
            runtime
                .with_download_base(base)
                .with_index_url(format!("{base}/?mode=json"))
        }
        None => runtime,
    }
}

/// Each runtime gets `<packages_dir>/<name>` as its install root; all of them
/// edit PATH through clones of one editor.
pub fn build_registry(
    settings: &AppSettings,
    packages_dir: &Path,
    target: HostTarget,
    http: Arc<dyn HttpClient>,
    path_editor: &PathEditor,
) -> Result<RuntimeRegistry, BackendError> {
    debug!("Install trees below {}", packages_dir.display());

    let go = GoBackend::new(
        go_runtime(target, settings.go_download_base.as_deref()),
        packages_dir.join("go"),
        Arc::clone(&http),
        path_editor.clone(),
    )
    .with_checksum_verification(settings.verify_checksums);

    let mut node_runtime = NodeRuntime::new(target);
    if let Some(mirror) = &settings.node_dist_mirror {
        node_runtime = node_runtime.with_mirror(mirror.as_str());
    }
    let node = NodeBackend::new(
        node_runtime,
        packages_dir.join("node"),
        http,
        path_editor.clone(),
    )
    .with_checksum_verification(settings.verify_checksums);

    Ok(RuntimeRegistry::builder()
        .register(go)?
        .register(node)?
        .build())
}
