use std::{sync::Arc, time::Duration};

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use quest_server::config::ServerConfig;
use quest_server::db::QuestStore;
use quest_server::quest::{HotReloadEvent, QuestCatalog, QuestSessions, RewardCalculator};

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::load(&ServerConfig::path_from_env())?;

    // Load quest catalog from TOML files
    let catalog = Arc::new(QuestCatalog::new(&config.data_dir));
    let report = catalog.load_all().await;
    if !report.failed_files.is_empty() {
        warn!("{} quest file(s) failed to load", report.failed_files.len());
    }

    let store = Arc::new(QuestStore::connect(&config.database_url, config.max_connections).await?);
    let sessions = Arc::new(QuestSessions::new(
        Arc::clone(&catalog),
        RewardCalculator::new(config.rewards.clone()),
    ));

    // Start hot-reload watcher for quest files
    if config.hot_reload {
        match catalog.start_file_watcher() {
            Ok(mut rx) => {
                // Spawn task to log reload events and drop stale log entries
                let reload_sessions = Arc::clone(&sessions);
                tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        match event {
                            HotReloadEvent::Reloaded { path, loaded, skipped } => {
                                info!("Quest hot-reload from {}: {} loaded, {} skipped", path, loaded, skipped);
                                let purged = reload_sessions.purge_inactive().await;
                                if !purged.is_empty() {
                                    info!("Removed {} stale quest log entries after reload", purged.len());
                                }
                            }
                            HotReloadEvent::Error(e) => {
                                error!("Quest hot-reload error: {}", e);
                            }
                        }
                    }
                });
                info!("Quest hot-reload enabled");
            }
            Err(e) => {
                warn!("Failed to start quest hot-reload: {}", e);
            }
        }
    }

    // Spawn quest timer loop
    let tick_sessions = Arc::clone(&sessions);
    let tick_interval = Duration::from_millis(config.tick_interval_ms.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick_interval);
        loop {
            interval.tick().await;
            for (character_id, quest_id) in tick_sessions.tick_all(tick_interval) {
                info!("Quest {} failed for character {}: time limit", quest_id, character_id);
            }
        }
    });

    // Spawn auto-save loop
    let save_sessions = Arc::clone(&sessions);
    let save_store = Arc::clone(&store);
    let save_interval = Duration::from_secs(config.save_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(save_interval);
        loop {
            interval.tick().await;
            save_sessions.flush(&save_store).await;
        }
    });

    info!(
        "Quest server running with {} quests (data dir {:?})",
        catalog.count().await,
        config.data_dir
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down, saving {} open quest log(s)", sessions.len());
    sessions.flush(&store).await;

    Ok(())
}
