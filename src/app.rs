use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::core::{
    alerts::engine::AlertEngine,
    clock::SystemClock,
    config::ConfigManager,
    coordinator::Coordinator,
    notify::LogNotifier,
    snapshot::SnapshotStore,
    source::{AlertSource, FileAlertSource},
};

#[derive(Debug, Parser)]
#[command(name = "storm-watcher", about = "Weather alert notifications without the spam")]
struct Cli {
    /// Directory holding settings.json and alert_state.json
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,
    /// Alert feed to poll, overrides feed_path from settings
    #[arg(long)]
    feed: Option<PathBuf>,
    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

pub fn run() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Failed to start async runtime: {}", e);
            return;
        }
    };
    runtime.block_on(poll_loop(cli));
}

async fn poll_loop(cli: Cli) {
    let config_manager = ConfigManager::new(cli.config_dir.clone());
    let snapshot_store = SnapshotStore::new(cli.config_dir.clone());
    let initial_settings = config_manager.load();

    let engine = match snapshot_store.load() {
        Ok(Some(snapshot)) => {
            log::info!("Restored {} tracked alerts", snapshot.states.len());
            AlertEngine::from_snapshot(snapshot, initial_settings.store.clone())
        }
        Ok(None) => AlertEngine::new(initial_settings.store.clone()),
        Err(e) => {
            log::warn!("Could not read saved alert state: {}", e);
            AlertEngine::new(initial_settings.store.clone())
        }
    };

    // This task owns the coordinator, so it is the engine's only writer.
    let mut coordinator = Coordinator::new(engine, LogNotifier, Arc::new(SystemClock));
    let mut current_feed = cli.feed.clone().unwrap_or(initial_settings.feed_path);
    let mut source = FileAlertSource::new(&current_feed);
    log::info!("Alert watcher started. Monitoring: {:?}", current_feed);

    loop {
        // Hot-reload settings every cycle
        let settings = config_manager.load();
        coordinator.set_store_config(settings.store.clone());
        let wanted_feed = cli.feed.clone().unwrap_or_else(|| settings.feed_path.clone());
        if wanted_feed != current_feed {
            log::info!("Alert feed changed to {:?}", wanted_feed);
            current_feed = wanted_feed;
            source = FileAlertSource::new(&current_feed);
        }

        match source.fetch() {
            Ok(alerts) => {
                let output = coordinator.tick(&alerts, &settings.alert_settings);
                for msg in output.logs {
                    log::info!("{}", msg);
                }
                if let Err(e) = snapshot_store.save(&coordinator.engine().snapshot()) {
                    log::warn!("Could not save alert state: {}", e);
                }
            }
            // Skip the cycle rather than treat a bad read as "all alerts gone"
            Err(e) => log::warn!("Could not read alert feed {:?}: {}", source.path(), e),
        }

        if cli.once {
            break;
        }

        let interval = Duration::from_secs(settings.poll_interval_seconds.max(1));
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                log::info!("Shutting down");
                break;
            }
        }
    }
}
