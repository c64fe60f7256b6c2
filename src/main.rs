//! ferry CLI
//!
//! Keeps a local folder of machine-code files in sync with a remote folder.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ferry::fs::{LocalStore, OpendalRemote};
use ferry::sync::config::default_config_path;
use ferry::sync::{
    ActionKind, ConfigSource, SchedulerHooks, SyncAction, SyncEngine, SyncScheduler, TickOutcome,
    TickReport, TomlConfigFile,
};

#[derive(Parser)]
#[command(name = "ferry")]
#[command(about = "Sync a local print folder with cloud storage")]
#[command(version)]
struct Cli {
    /// Config file (re-read before every sync)
    #[arg(short, long, env = "FERRY_CONFIG")]
    config: Option<PathBuf>,

    /// Local storage root (overrides `storage.local_root`)
    #[arg(long)]
    local_root: Option<PathBuf>,

    /// Remote URI, e.g. s3://bucket/prefix (overrides `storage.remote`)
    #[arg(long)]
    remote: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync on an interval until interrupted
    Run {
        /// Sync once right after starting
        #[arg(long)]
        now: bool,
    },
    /// Run a single sync and exit
    Once,
    /// Show what a sync would do without doing it
    Plan,
}

/// The `[storage]` table of the config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StorageSettings {
    local_root: Option<PathBuf>,
    remote: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileSettings {
    storage: StorageSettings,
}

fn read_storage_settings(path: &Path) -> Result<StorageSettings> {
    if !path.exists() {
        return Ok(StorageSettings::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let settings: FileSettings =
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(settings.storage)
}

fn build_engine(cli: &Cli, config_path: &Path, local_folder: &str) -> Result<SyncEngine> {
    let settings = read_storage_settings(config_path)?;

    let local_root = cli
        .local_root
        .clone()
        .or(settings.local_root)
        .or_else(|| dirs::data_dir().map(|dir| dir.join("ferry")))
        .context("No local root configured and no data directory available")?;
    let remote_uri = match cli.remote.clone().or(settings.remote) {
        Some(uri) => uri,
        None => bail!(
            "No remote configured: pass --remote or set storage.remote in {}",
            config_path.display()
        ),
    };

    let local = LocalStore::new(&local_root);
    local
        .ensure_folder(local_folder)
        .with_context(|| format!("Failed to prepare {}", local_root.display()))?;
    let remote = OpendalRemote::from_uri(&remote_uri)?;

    info!("Local root: {}", local_root.display());
    info!("Remote: {}", remote_uri);

    Ok(SyncEngine::new(Arc::new(local), Arc::new(remote)))
}

fn action_label(action: &SyncAction) -> colored::ColoredString {
    let label = format!("{:>13}", action.kind().to_string());
    match action.kind() {
        ActionKind::Upload => label.green(),
        ActionKind::Download => label.cyan(),
        ActionKind::DeleteLocal | ActionKind::DeleteRemote => label.red(),
    }
}

fn print_report(report: &TickReport) {
    let stats = &report.stats;
    println!(
        "{} {} in {:.2}s: {} uploaded, {} downloaded, {} deleted locally, {} deleted remotely",
        "Synced".bold(),
        report.mode.description(),
        report.duration.as_secs_f64(),
        stats.uploaded,
        stats.downloaded,
        stats.deleted_local,
        stats.deleted_remote
    );
    for failure in &stats.failed {
        println!("{} {}: {}", action_label(&failure.action), failure.action.path(), failure.error.red());
    }
}

#[cfg(unix)]
async fn wait_for_shutdown(scheduler: &SyncScheduler) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut wake = signal(SignalKind::user_defined1()).context("Failed to listen for SIGUSR1")?;
    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => return res.context("Failed to listen for Ctrl-C"),
            _ = wake.recv() => scheduler.sync_now(),
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_scheduler: &SyncScheduler) -> Result<()> {
    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .or_else(default_config_path)
        .context("No config file given and no config directory available")?;
    let source = TomlConfigFile::new(&config_path);
    let config = source.load()?;

    let engine = build_engine(&cli, &config_path, &config.local_folder)?;

    match cli.command {
        Commands::Plan => {
            let actions = engine.preview(&config).await?;
            if actions.is_empty() {
                println!("{}", "Nothing to do".green());
            }
            for action in &actions {
                println!("{} {}", action_label(action), action.path());
            }
        }
        Commands::Once => {
            let scheduler = SyncScheduler::new(engine, Arc::new(source), SchedulerHooks::new());
            match scheduler.run_once().await {
                TickOutcome::Completed(report) => {
                    print_report(&report);
                    if !report.stats.is_clean() {
                        bail!("{} sync actions failed", report.stats.failed_count());
                    }
                }
                TickOutcome::Aborted(e) => return Err(e.into()),
                TickOutcome::Skipped => println!("{}", "Sync skipped".yellow()),
            }
        }
        Commands::Run { now } => {
            let scheduler = SyncScheduler::new(engine, Arc::new(source), SchedulerHooks::new());
            scheduler.start();
            if now {
                scheduler.sync_now();
            }
            println!(
                "Syncing {} every {}s (Ctrl-C to stop)",
                config.mode.description(),
                config.poll_interval.as_secs()
            );

            wait_for_shutdown(&scheduler).await?;
            info!("Shutting down");
            scheduler.stop().await;
        }
    }

    Ok(())
}
