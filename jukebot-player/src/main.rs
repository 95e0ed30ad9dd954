//! Jukebot - Main entry point
//!
//! Wires the playback controller to a child-process voice connection, the
//! SQLite track catalog, the yt-dlp media source and a console chat, then
//! runs until stdin closes or a shutdown signal arrives.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use jukebot_common::config::{load_toml_or_default, RootFolderInitializer};
use jukebot_common::db::init_database;
use jukebot_player::catalog::SqliteCatalog;
use jukebot_player::commands::{CommandHandler, CommandSettings};
use jukebot_player::config::{Config, ConfigOverrides, TomlConfig};
use jukebot_player::console::{run_console, ConsoleTransport, CONSOLE_USER};
use jukebot_player::dispatch::Dispatcher;
use jukebot_player::media::{AllowList, YtDlpMediaSource};
use jukebot_player::messages::NOT_PLAYING;
use jukebot_player::playback::persistence::{load_playlist, save_playlist};
use jukebot_player::playback::PlaybackController;
use jukebot_player::process::ProcessVoice;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for jukebot
#[derive(Parser, Debug)]
#[command(name = "jukebot")]
#[command(about = "Voice chat music bot")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, default_value = "jukebot.toml", env = "JUKEBOT_CONFIG")]
    config: PathBuf,

    /// Root folder for the catalog and saved playlists
    #[arg(short, long, env = "JUKEBOT_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Track catalog database
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// URL prefix allow-list
    #[arg(short, long)]
    whitelist: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Do not restore or save the default playlist
    #[arg(long)]
    no_restore: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config: TomlConfig =
        load_toml_or_default(&args.config).context("Failed to load configuration")?;
    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| toml_config.logging.level.clone());
    init_tracing(&level, toml_config.logging.file.as_deref())?;

    info!("Starting jukebot v{}", env!("CARGO_PKG_VERSION"));
    if !args.config.exists() {
        warn!("Config file {} not found, using built-in defaults", args.config.display());
    }

    let config = Config::resolve(
        toml_config,
        ConfigOverrides {
            root_folder: args.root_folder.clone(),
            database_path: args.database.clone(),
            whitelist_path: args.whitelist.clone(),
            log_level: args.log_level.clone(),
        },
    );

    RootFolderInitializer::new(config.root_folder.clone())
        .ensure_directory_exists()
        .context("Failed to prepare root folder")?;

    let pool = init_database(&config.database_path)
        .await
        .context("Failed to open track catalog")?;
    let catalog = Arc::new(SqliteCatalog::new(pool));

    let allow_list = AllowList::load(&config.whitelist_path)
        .await
        .context("Failed to read allow-list")?;
    let media = Arc::new(YtDlpMediaSource::new(allow_list, config.ytdlp_path.clone()));

    let voice = Arc::new(ProcessVoice::new(config.process_voice()));
    voice.register_user(CONSOLE_USER);

    let (dispatcher, dispatch_worker) =
        Dispatcher::spawn(Arc::new(ConsoleTransport::stdout()), config.dispatch.policy());

    let controller = PlaybackController::new(
        voice,
        media,
        catalog.clone(),
        dispatcher.clone(),
        config.controller_options(),
    );
    dispatcher.set_status(NOT_PLAYING);

    if !args.no_restore {
        restore_queue(&controller, &config.playlist_dir, &config.playlist_name).await;
    }

    let handler = CommandHandler::new(
        controller.clone(),
        catalog,
        dispatcher.clone(),
        CommandSettings {
            prefix: config.command_prefix.clone(),
            bot_name: config.username.clone(),
            max_lines: config.max_lines,
            playlist_dir: config.playlist_dir.clone(),
            playlist_name: config.playlist_name.clone(),
        },
    );

    let shutdown = CancellationToken::new();
    let console = tokio::spawn(run_console(handler, shutdown.clone()));

    tokio::select! {
        _ = shutdown_signal() => {}
        result = console => {
            match result {
                Ok(Ok(())) => info!("Console closed, shutting down"),
                Ok(Err(e)) => warn!("Console failed: {}", e),
                Err(e) => warn!("Console task panicked: {}", e),
            }
        }
    }
    shutdown.cancel();

    controller.stop(true).await;
    if !args.no_restore {
        let remaining = controller.remaining_tracks().await;
        if let Err(e) = save_playlist(&config.playlist_dir, &config.playlist_name, &remaining).await {
            warn!("Failed to save playlist: {}", e);
        }
    }

    drop(controller);
    drop(dispatcher);
    if tokio::time::timeout(Duration::from_secs(2), dispatch_worker)
        .await
        .is_err()
    {
        warn!("Outbound messages still pending at shutdown");
    }

    info!("Shutdown complete");
    Ok(())
}

fn init_tracing(level: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("jukebot_player={level},jukebot_common={level},jukebot={level}").into()
    });

    let (file_layer, stderr_layer) = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file));
            (Some(layer), None)
        }
        None => (
            None,
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
    Ok(())
}

async fn restore_queue(controller: &PlaybackController, dir: &Path, name: &str) {
    match load_playlist(dir, name).await {
        Ok(Some(saved)) if !saved.tracks.is_empty() => {
            info!(saved_at = %saved.saved_at, "Restoring saved queue");
            controller.replace_queue(saved.tracks).await;
        }
        Ok(_) => {}
        Err(e) => warn!("Failed to restore saved queue: {}", e),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
