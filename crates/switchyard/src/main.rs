mod error;
mod logging;
mod retry;
mod runtimes;
mod settings;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{info, warn};
use switchyard_backend::{BackendError, InstallPhase, InstallProgress, VersionManager};
use switchyard_platform::{AppPaths, PATH_SEPARATOR, PathEditor};
use tokio::sync::mpsc;

use crate::error::CliError;
use crate::retry::retry_with_delays;
use crate::runtimes::Runtimes;

#[derive(Debug, Parser)]
#[command(name = "switchyard", version, about = "Install and switch Go and Node.js toolchains")]
struct Cli {
    /// Log debug output to stderr and the log file.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the managed runtimes and their install roots.
    Runtimes,
    /// List installed versions, or the remote index with --remote.
    List {
        runtime: String,
        #[arg(long)]
        remote: bool,
        /// Only long-term-support lines.
        #[arg(long, requires = "remote")]
        lts: bool,
    },
    Install {
        runtime: String,
        version: String,
    },
    Uninstall {
        runtime: String,
        version: String,
    },
    /// Make a version the active one.
    Use {
        runtime: String,
        version: String,
    },
    /// Same as `use`.
    Default {
        runtime: String,
        version: String,
    },
    /// Show the active version of one or every runtime.
    Current { runtime: Option<String> },
    /// Print the managed PATH for the current shell.
    Env,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log::debug!("Command failed: {error:?}");
            eprintln!("error [{}]: {error}", error.kind());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let paths = AppPaths::new()?;
    let (settings, settings_warning) = settings::startup_settings(&paths);
    logging::init_logging(
        &paths,
        cli.debug || settings.debug_logging,
        settings.max_log_size_bytes,
    );
    if let Some(warning) = settings_warning {
        warn!("{warning}");
    }

    let runtimes = Runtimes::for_host(&settings, &paths)?;
    let registry = &runtimes.registry;

    match cli.command {
        Command::Runtimes => {
            for manager in registry.iter() {
                println!(
                    "{:<6} {:<8} {}",
                    manager.name(),
                    manager.display_name(),
                    manager.install_root().display()
                );
            }
        }
        Command::List {
            runtime,
            remote,
            lts,
        } => {
            let manager = registry.get(&runtime)?;
            if remote {
                list_remote(manager, lts).await?;
            } else {
                list_installed(manager).await?;
            }
        }
        Command::Install { runtime, version } => {
            let manager = registry.get(&runtime)?;
            let message = install(manager, &version, &settings.retry_delays()).await?;
            println!("{message}");
        }
        Command::Uninstall { runtime, version } => {
            println!("{}", registry.get(&runtime)?.uninstall(&version).await?);
        }
        Command::Use { runtime, version } => {
            println!("{}", registry.get(&runtime)?.use_version(&version).await?);
        }
        Command::Default { runtime, version } => {
            println!("{}", registry.get(&runtime)?.set_default(&version).await?);
        }
        Command::Current { runtime } => {
            let managers: Vec<&dyn VersionManager> = match runtime {
                Some(name) => vec![registry.get(&name)?],
                None => registry.iter().collect(),
            };
            for manager in managers {
                let current = manager.current_version().await?;
                println!(
                    "{}: {}",
                    manager.name(),
                    current.map_or_else(|| "none".to_string(), |tag| tag.raw().to_string())
                );
            }
        }
        Command::Env => print_env(&runtimes.path_editor)?,
    }

    Ok(())
}

async fn list_remote(manager: &dyn VersionManager, lts_only: bool) -> Result<(), BackendError> {
    let remote = if lts_only {
        manager.list_remote_lts().await?
    } else {
        manager.list_remote().await?
    };
    for entry in remote {
        let label = entry.version.to_string();
        match entry.release_date {
            Some(date) => println!("{label:<28} {date}"),
            None => println!("{label}"),
        }
    }
    Ok(())
}

async fn list_installed(manager: &dyn VersionManager) -> Result<(), BackendError> {
    let installed = manager.list_installed().await?;
    if installed.is_empty() {
        println!("No {} versions installed", manager.display_name());
        return Ok(());
    }
    for entry in installed {
        let marker = if entry.is_active { '*' } else { ' ' };
        let date = entry
            .install_date
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        let size = entry.disk_size.map(format_bytes).unwrap_or_default();
        println!("{marker} {:<16} {date:<10} {size:>9}", entry.version.raw());
    }
    Ok(())
}

/// Installs with the configured retry schedule while a background task
/// prints phase changes.
async fn install(
    manager: &dyn VersionManager,
    version: &str,
    retry_delays: &[u64],
) -> Result<String, BackendError> {
    let (tx, rx) = mpsc::channel(64);
    let printer = tokio::spawn(print_progress(rx));

    let result = retry_with_delays("install", retry_delays, || {
        manager.install_with_progress(version, Some(tx.clone()))
    })
    .await;

    drop(tx);
    let _ = printer.await;
    if result.is_ok() {
        info!("{} {version} install finished", manager.name());
    }
    result
}

async fn print_progress(mut rx: mpsc::Receiver<InstallProgress>) {
    let mut last_phase: Option<InstallPhase> = None;
    let mut last_step = None;

    while let Some(event) = rx.recv().await {
        if last_phase.as_ref() != Some(&event.phase) {
            eprintln!("{} {}: {}", event.runtime, event.version, event.phase);
            last_phase = Some(event.phase.clone());
            last_step = None;
        }
        if event.phase == InstallPhase::Downloading
            && let Some(step) = percent_step(event.downloaded, event.total)
            && last_step < Some(step)
        {
            eprintln!(
                "  {step:>3}% ({} of {})",
                format_bytes(event.downloaded),
                format_bytes(event.total.unwrap_or_default())
            );
            last_step = Some(step);
        }
    }
}

/// Download progress rounded down to tens of percent.
fn percent_step(downloaded: u64, total: Option<u64>) -> Option<u64> {
    let total = total.filter(|total| *total > 0)?;
    if downloaded == 0 {
        return None;
    }
    let percent = downloaded.saturating_mul(100) / total;
    Some(percent.min(100) / 10 * 10)
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes;
    let mut unit = 0;
    while value >= 1024 * 10 && unit < UNITS.len() - 1 {
        value /= 1024;
        unit += 1;
    }
    format!("{value} {}", UNITS[unit])
}

/// On Windows the registry already holds the user PATH; elsewhere the managed
/// segments are printed as a shell export to `eval`.
fn print_env(path_editor: &PathEditor) -> Result<(), CliError> {
    let managed = path_editor.current_value()?;
    if cfg!(windows) {
        println!("{managed}");
    } else if !managed.is_empty() {
        println!("export PATH=\"{managed}{PATH_SEPARATOR}$PATH\"");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command, format_bytes, percent_step};

    #[test]
    fn percent_step_rounds_down_to_tens() {
        assert_eq!(percent_step(0, Some(100)), None);
        assert_eq!(percent_step(5, None), None);
        assert_eq!(percent_step(19, Some(100)), Some(10));
        assert_eq!(percent_step(100, Some(100)), Some(100));
        assert_eq!(percent_step(250, Some(100)), Some(100));
    }

    #[test]
    fn byte_sizes_stay_readable() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(64 * 1024 * 1024), "64 MiB");
    }

    #[test]
    fn parses_list_with_remote_lts() {
        let cli = Cli::try_parse_from(["switchyard", "list", "node", "--remote", "--lts"])
            .expect("arguments parse");

        assert!(matches!(
            cli.command,
            Command::List { ref runtime, remote: true, lts: true } if runtime == "node"
        ));
    }

    #[test]
    fn lts_requires_remote() {
        assert!(Cli::try_parse_from(["switchyard", "list", "node", "--lts"]).is_err());
    }

    #[test]
    fn debug_flag_is_global() {
        let cli = Cli::try_parse_from(["switchyard", "install", "go", "go1.22.3", "--debug"])
            .expect("arguments parse");

        assert!(cli.debug);
        assert!(matches!(cli.command, Command::Install { .. }));
    }
}
