mod auth;
mod config;
mod controller;
mod error;
mod keys;
mod logging;
mod model;

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use tokio::sync::mpsc;

use config::{AppConfig, AppPaths};
use controller::AppController;
use keys::DevicePoller;
use model::{MembershipCache, Notification, SpotifyClient};

const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(2);

type Controller = Arc<AppController<DevicePoller>>;

#[tokio::main]
async fn main() -> Result<()> {
    let paths = AppPaths::discover()?;

    if let Err(e) = logging::init_logging(&paths.log_dir) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    tracing::info!("=== Playlist Plus Starting ===");

    if !paths.config_file.exists() {
        // Give the user a file to edit
        if let Err(e) = AppConfig::default().save(&paths.config_file) {
            tracing::warn!(error = %e, "Could not write default config");
        }
    }
    let initial = AppConfig::load(&paths.config_file);

    let spotify = auth::authorize(&paths.token_cache_file).await?;
    let service = Arc::new(SpotifyClient::new(spotify));
    let cache = MembershipCache::new(paths.cache_file.clone());

    let (notify_tx, mut notify_rx) = mpsc::unbounded_channel();
    let controller: Controller = Arc::new(AppController::new(
        service,
        cache,
        DevicePoller::default(),
        notify_tx,
    ));

    if initial.playlist_id().is_none() {
        println!(
            "No playlist configured. Set \"playlist_id\" in {}",
            paths.config_file.display()
        );
    }
    controller.apply_config(initial).await;

    tokio::spawn(watch_config(controller.clone(), paths.config_file.clone()));
    let mut commands = spawn_command_reader(std::io::BufReader::new(std::io::stdin()));

    println!("Playlist Plus running. Commands: refresh, add, quit");

    loop {
        tokio::select! {
            Some(notification) = notify_rx.recv() => show(notification),
            Some(line) = commands.recv() => {
                if !run_command(&controller, line.trim()).await {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received");
                break;
            }
        }
    }

    controller.shutdown().await;
    tracing::info!("Playlist Plus shutting down");
    Ok(())
}

fn show(notification: Notification) {
    match notification {
        Notification::Success { display_text, image } => match image {
            Some(bytes) => println!("Added: {} ({} bytes of album art)", display_text, bytes.len()),
            None => println!("Added: {}", display_text),
        },
        Notification::Duplicate => println!("Already in playlist"),
    }
}

/// Re-apply the config file whenever its modification time changes.
async fn watch_config(controller: Controller, path: PathBuf) {
    let mut last_modified = modified_at(&path).await;
    let mut interval = tokio::time::interval(CONFIG_POLL_INTERVAL);
    interval.tick().await;

    loop {
        interval.tick().await;
        let modified = modified_at(&path).await;
        if modified == last_modified {
            continue;
        }
        last_modified = modified;

        tracing::info!(path = %path.display(), "Config file changed, reloading");
        let load_path = path.clone();
        match tokio::task::spawn_blocking(move || AppConfig::load(&load_path)).await {
            Ok(config) => controller.apply_config(config).await,
            Err(e) => tracing::error!(error = %e, "Config reload task failed"),
        }
    }
}

async fn modified_at(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

/// Forward input lines from a plain thread. A blocking read on the runtime's blocking pool
/// would keep the runtime from shutting down until the next line arrives.
fn spawn_command_reader<R>(input: R) -> mpsc::UnboundedReceiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let spawned = thread::Builder::new()
        .name("command-reader".to_string())
        .spawn(move || {
            for line in input.lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Could not read command");
                        return;
                    }
                }
            }
            // No terminal attached; keep running on the hotkey alone
            tracing::debug!("Command input closed");
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "Could not start command reader");
    }
    rx
}

/// Returns `false` when the user asked to quit.
async fn run_command(controller: &Controller, command: &str) -> bool {
    match command {
        "" => {}
        "refresh" => {
            controller.refresh().await;
            println!("Refreshing playlist cache");
        }
        "add" => {
            let pipeline = controller.pipeline().clone();
            tokio::spawn(async move {
                let _ = pipeline.trigger().await;
            });
        }
        "quit" | "exit" => return false,
        other => println!("Unknown command: {}", other),
    }
    true
}
