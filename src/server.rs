//! Top-level wiring: build the shared `PipelineContext`, bind the three
//! listeners, and start the config watcher. `main.rs` owns the CLI surface
//! and signal handling; this module owns assembling the collaborators.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::blocklist::BlocklistManager;
use crate::cache::ResponseCache;
use crate::config::Config;
use crate::config_watch::ConfigWatcher;
use crate::error::Result;
use crate::graceful_shutdown::GracefulShutdown;
use crate::pipeline::PipelineContext;
use crate::storage::{SqliteStorage, Storage};
use crate::transport::ListenerManager;

/// Everything `main.rs` needs a handle to after startup: the shutdown
/// coordinator to invoke on signal, and the config-watcher shutdown channel
/// it's registered under.
pub struct Runtime {
    pub shutdown: Arc<GracefulShutdown>,
}

/// Build every collaborator, bind the listeners, and start the config
/// watcher. Returns once the system is fully up and serving.
pub async fn bootstrap(config_path: PathBuf, db_path: &str, hostname: String) -> Result<Runtime> {
    let config_bytes = tokio::fs::read(&config_path).await.map_err(crate::error::Error::Io)?;
    let config: Config = serde_yaml::from_slice(&config_bytes)
        .map_err(|err| crate::error::Error::ConfigInvalid(err.to_string()))?;
    config.validate()?;

    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::connect(db_path).await?);
    let cache = Arc::new(ResponseCache::new(config.cache.max_size, Duration::from_secs(config.cache.ttl)));
    let blocklist = Arc::new(BlocklistManager::new(
        &config.adsblock.blacklist,
        &config.adsblock.custom,
        &config.adsblock.whitelist,
    ));

    info!("performing initial blocklist refresh");
    blocklist.refresh(true, storage.as_ref()).await;

    let hash = crate::config_watch::hash_bytes(&config_bytes);
    storage.upsert_setting("config-sha256", &hash).await?;

    let ctx = PipelineContext::new(cache, blocklist.clone(), storage.clone(), config.clone(), hostname);

    let listeners = Arc::new(ListenerManager::new());
    listeners
        .start(&config, ctx.clone())
        .await
        .map_err(|source| crate::error::Error::BindFatal { addr: format!("{:?}", config.dns), source })?;
    info!("listeners bound");

    let watcher = Arc::new(ConfigWatcher::new(config_path, ctx.clone(), blocklist, listeners.clone()));
    let (watcher_shutdown_tx, watcher_shutdown_rx) = tokio::sync::watch::channel(false);
    let watcher_task = {
        let watcher = watcher.clone();
        tokio::spawn(async move { watcher.run(watcher_shutdown_rx).await })
    };

    let shutdown = Arc::new(GracefulShutdown::new(listeners, storage));
    shutdown
        .register_component("config-watcher", move || {
            let tx = watcher_shutdown_tx.clone();
            async move {
                let _ = tx.send(true);
                Ok(())
            }
        })
        .await;
    // The watcher task itself is fire-and-forget: it exits once its shutdown
    // channel fires, which `register_component` above triggers.
    drop(watcher_task);

    Ok(Runtime { shutdown })
}
