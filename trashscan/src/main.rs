//! `trashscan` operator CLI.
//!
//! One binary, one subcommand per machine role:
//!
//! - `capture` on the scanning device
//! - `sync` on the processing machine, pulling complete session folders
//! - `dispatch` on the processing machine, submitting render jobs and
//!   mirroring finished models
//! - `mirror` for the output leg alone

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trashscan_config::{Config, ConfigLoad, ConfigLoader, ConfigLoaderOptions};
use trashscan_core::capture::{CaptureStation, LoggingMotor, StationHandle, start_camera};
use trashscan_core::dispatch::{Dispatcher, FolderWatcher, HttpRenderEngine};
use trashscan_core::mirror::OutputMirror;
use trashscan_core::transfer::{TransferPoller, TransferReport};

#[derive(Parser, Debug)]
#[command(name = "trashscan")]
#[command(about = "Unattended multi-view capture, transfer and render dispatch", version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug, Clone)]
struct GlobalArgs {
    /// Path to trashscan.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to a .env file (defaults to ./.env when present)
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the capture station: auto-trigger sessions and photograph every viewpoint
    Capture {
        /// Use a generated test pattern instead of the camera
        #[arg(long, default_value_t = false)]
        synthetic: bool,
    },
    /// Pull complete session folders from the capture source
    Sync {
        /// Run a single pass and print the report
        #[arg(long, default_value_t = false)]
        once: bool,
    },
    /// Watch for new session folders and submit render jobs; mirrors output alongside
    Dispatch {
        /// Do not run the output mirror loop in this process
        #[arg(long, default_value_t = false)]
        no_mirror: bool,
    },
    /// Mirror engine output into the object directory
    Mirror {
        /// Run a single pass and print the report
        #[arg(long, default_value_t = false)]
        once: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_runtime_config(&cli.global)?;

    match cli.command {
        Command::Capture { synthetic } => run_capture(config, synthetic).await,
        Command::Sync { once } => run_sync(config, once).await,
        Command::Dispatch { no_mirror } => run_dispatch(config, !no_mirror).await,
        Command::Mirror { once } => run_mirror(config, once).await,
    }
}

fn load_runtime_config(args: &GlobalArgs) -> anyhow::Result<Config> {
    let ConfigLoad { config, warnings } = ConfigLoader::with_options(ConfigLoaderOptions {
        config_path: args.config.clone(),
        env_file: args.env_file.clone(),
        ignore_env: false,
    })
    .load()
    .context("failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,capture::status=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "configuration file loaded");
    }
    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => warn!(message = %warning.message, hint = %hint, "configuration warning"),
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }

    Ok(config)
}

/// Cancelled on Ctrl-C.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested");
                trigger.cancel();
            }
            Err(err) => error!(error = %err, "failed to listen for Ctrl-C"),
        }
    });
    token
}

fn ensure_dir(path: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory {}", path.display()))
}

/// Each line on stdin requests a session outside the schedule.
fn spawn_stdin_trigger(handle: StationHandle) {
    let spawned = std::thread::Builder::new()
        .name("manual-trigger".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                if line.is_err() || !handle.trigger() {
                    break;
                }
            }
        });
    if let Err(err) = spawned {
        warn!(error = %err, "manual trigger unavailable");
    }
}

async fn run_capture(config: Config, synthetic: bool) -> anyhow::Result<()> {
    ensure_dir(&config.capture.capture_root)?;

    let camera =
        start_camera(&config.capture.camera, synthetic).context("failed to start frame source")?;
    let station = CaptureStation::new(
        &config.capture,
        config.viewpoints.clone(),
        camera.reader(),
        LoggingMotor,
    );
    spawn_stdin_trigger(station.handle());

    info!(
        root = %config.capture.capture_root.display(),
        views = config.viewpoints.len(),
        "capture station running; press Enter for a manual trigger"
    );
    let summary = station.run(shutdown_token()).await;
    camera.stop();

    info!(
        started = summary.sessions_started,
        completed = summary.sessions_completed,
        incomplete = summary.sessions_incomplete,
        abandoned = summary.abandoned.as_deref().unwrap_or("-"),
        "capture station finished"
    );
    Ok(())
}

async fn run_sync(config: Config, once: bool) -> anyhow::Result<()> {
    ensure_dir(&config.transfer.dest_root)?;
    let poller = TransferPoller::input_leg(&config.transfer, &config.viewpoints)
        .context("failed to set up transfer source")?;

    if once {
        let report = poller.run_once().await.context("transfer pass failed")?;
        print_report("sync", &report);
        return Ok(());
    }

    poller.run(shutdown_token()).await;
    Ok(())
}

async fn run_dispatch(config: Config, with_mirror: bool) -> anyhow::Result<()> {
    ensure_dir(&config.dispatch.watch_dir)?;
    ensure_dir(&config.dispatch.engine_input_dir())?;

    let engine = HttpRenderEngine::new(&config.dispatch.endpoint, config.dispatch.submit_timeout())
        .context("failed to build HTTP client")?;
    info!(endpoint = %engine.endpoint(), "render engine configured");

    let dispatcher = Arc::new(Dispatcher::new(
        &config.dispatch,
        config.viewpoints.clone(),
        Arc::new(engine),
    ));
    let watcher = FolderWatcher::new(&config.dispatch.watch_dir, dispatcher);
    let cancel = shutdown_token();

    let mirror_task = if with_mirror {
        let mirror = OutputMirror::from_config(&config.mirror, &config.dispatch);
        mirror.ensure_dirs().context("failed to prepare mirror directories")?;
        Some(tokio::spawn(mirror.run(cancel.clone())))
    } else {
        None
    };

    let summary = watcher
        .run(cancel.clone())
        .await
        .context("folder watcher failed")?;
    cancel.cancel();
    if let Some(task) = mirror_task
        && let Err(err) = task.await
    {
        warn!(error = %err, "mirror task ended abnormally");
    }

    info!(
        seen = summary.folders_seen,
        submitted = summary.submitted,
        skipped = summary.skipped,
        failed = summary.failed,
        "dispatch finished"
    );
    Ok(())
}

async fn run_mirror(config: Config, once: bool) -> anyhow::Result<()> {
    let mirror = OutputMirror::from_config(&config.mirror, &config.dispatch);
    mirror.ensure_dirs().context("failed to prepare mirror directories")?;

    if once {
        let report = mirror.run_once().await.context("mirror pass failed")?;
        print_report("mirror", &report);
        return Ok(());
    }

    mirror.run(shutdown_token()).await;
    Ok(())
}

fn print_report(mode: &str, report: &TransferReport) {
    println!(
        "{mode}: {} copied ({} bytes), {} already present",
        report.files_copied(),
        report.bytes_copied,
        report.files_present
    );
    if report.folders_seen > 0 {
        println!(
            "{mode}: {} folders seen, {} incomplete",
            report.folders_seen,
            report.folders_incomplete.len()
        );
    }
    for folder in &report.folders_incomplete {
        println!("  waiting: {folder}");
    }
    for folder in &report.folders_failed {
        println!("  failed: {folder}");
    }
    for path in &report.failed {
        println!("  failed: {}", path.display());
    }
}
