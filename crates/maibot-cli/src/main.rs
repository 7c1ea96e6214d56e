//! MaiBot Launcher - interactive console for managing MaiBot instances.
//!
//! Wraps the `maibot_core` library in letter-keyed menus for launching,
//! configuring, deploying and updating bot instances.

mod editor;
mod menus;
mod prompt;
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use maibot_core::{platform, AppConfig, Launcher};
use menus::App;
use prompt::ConsolePrompt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::EnvFilter;

const LOG_FILE_NAME: &str = "launcher.log";

#[derive(Parser, Debug)]
#[command(name = "maibot-launcher")]
#[command(version, about = "Console launcher and installer for MaiBot")]
struct Args {
    /// Instance store
    #[arg(short, long, default_value = AppConfig::CONFIG_FILE)]
    config: PathBuf,

    /// Directory for caches and logs
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Log filter directive, e.g. `maibot_core=trace,info`
    #[arg(long)]
    log_filter: Option<String>,

    /// Also write logs to `<data-dir>/logs/launcher.log`
    #[arg(long)]
    log_file: bool,

    /// Skip the GitHub API and use cached or built-in version lists
    #[arg(long)]
    offline: bool,
}

/// Logs go to stderr so the menus on stdout stay readable.
fn init_logging(args: &Args, data_dir: &Path) -> Result<()> {
    let filter = match &args.log_filter {
        Some(directive) => EnvFilter::try_new(directive)
            .with_context(|| format!("invalid --log-filter '{}'", directive))?,
        None if args.debug => EnvFilter::new("debug"),
        None => EnvFilter::new("info"),
    };

    let writer = if args.log_file {
        let dir = data_dir.join(AppConfig::LOGS_DIR_NAME);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let path = dir.join(LOG_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        BoxMakeWriter::new(std::io::stderr.and(Arc::new(file)))
    } else {
        BoxMakeWriter::new(std::io::stderr)
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(!args.log_file)
        .with_target(false)
        .with_thread_ids(false);
    if args.log_json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let data_dir = platform::launcher_data_dir(args.data_dir.as_deref());
    init_logging(&args, &data_dir)?;

    info!("Starting {} v{}", AppConfig::APP_NAME, AppConfig::VERSION);
    info!("Config: {}", args.config.display());
    info!("Data dir: {}", data_dir.display());

    let launcher = Launcher::builder(&args.config)
        .data_dir(&data_dir)
        .auto_create_dirs(true)
        .offline(args.offline)
        .build()?;

    // Ctrl+C stops whatever the launcher started before exiting.
    let processes = launcher.processes().clone();
    let downloads = launcher.downloads().clone();
    ctrlc::set_handler(move || {
        downloads.cancel();
        let stopped = processes.stop_all();
        eprintln!();
        eprintln!("已停止 {} 个进程，退出", stopped);
        std::process::exit(130);
    })
    .context("failed to install Ctrl+C handler")?;

    let store = launcher.load_store()?;
    if let Some(message) = store.load_error() {
        warn!("Config file could not be parsed: {}", message);
    }

    let mut app = App::new(launcher, store);
    app.run(&mut ConsolePrompt::new()).await?;
    info!("Launcher exited");
    Ok(())
}
