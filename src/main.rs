use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use game_hub_lib::{watch, Hub, HubConfig, Reconciliation};

/// Watch a Game Hub workspace and keep sessions consistent with the disk.
#[derive(Debug, Parser)]
#[command(name = "game-hub", version, about)]
struct Args {
    /// Workspace folder (defaults to the configured one, then the current dir)
    root: Option<PathBuf>,

    /// Autosave delay in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Config file to use instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => HubConfig::load_from(path)?,
        None => HubConfig::load()?,
    };
    if let Some(delay) = args.delay_ms {
        config.autosave_delay_ms = delay;
    }
    let root = match args.root.or_else(|| config.workspace_root.clone()) {
        Some(root) => root,
        None => std::env::current_dir().context("No workspace folder given")?,
    };
    config.workspace_root = Some(root.clone());

    let debounce = config.watch_debounce();
    let hub = Hub::with_local_fs(config);
    {
        let mut sessions = hub.sessions();
        sessions.set_current_folder(Some(root.clone()));
        log::info!(
            "Restored view {} (selected: {})",
            sessions.current_view(),
            sessions
                .selected_file()
                .map_or_else(|| "none".to_string(), |p| p.display().to_string())
        );
    }

    // A remembered file may have vanished while we were away.
    let selected = hub.sessions().selected_file().map(PathBuf::from);
    if let Some(selected) = selected {
        if let Err(e) = hub.open_file(&selected).await {
            log::warn!("Could not reopen {}: {:?}", selected.display(), e);
        }
    }

    let mut subscription = watch(&root, debounce)?;
    log::info!("Game Hub core running on {}", root.display());

    loop {
        tokio::select! {
            event = subscription.next() => {
                let Some(event) = event else { break };
                for action in hub.handle_fs_event(&event).await {
                    match action {
                        Reconciliation::Evicted { path, closed } => {
                            log::info!("{} is gone ({} document(s) closed)", path.display(), closed.len())
                        }
                        Reconciliation::RefreshListing { dir } => {
                            log::debug!("Listing of {} is stale", dir.display())
                        }
                        Reconciliation::ExternallyModified { path } => {
                            log::warn!("{} changed on disk", path.display())
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Shutting down");
                break;
            }
        }
    }

    hub.shutdown().await;
    Ok(())
}
