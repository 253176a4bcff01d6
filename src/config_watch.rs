//! Config hot-reload (SPEC_FULL.md §4.5): a content-hash poller, not a
//! filesystem-event watcher. Every 10 minutes, and once at startup, it reads
//! the config file, hashes it, and reloads only on a hash change against the
//! persisted `config-sha256` setting.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ring::digest;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

use crate::blocklist::BlocklistManager;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::pipeline::PipelineContext;
use crate::transport::ListenerManager;

const POLL_INTERVAL: Duration = Duration::from_secs(600);
const CONFIG_HASH_KEY: &str = "config-sha256";

pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(digest::digest(&digest::SHA256, bytes).as_ref())
}

pub struct ConfigWatcher {
    path: PathBuf,
    ctx: Arc<PipelineContext>,
    blocklist: Arc<BlocklistManager>,
    listeners: Arc<ListenerManager>,
    reload_lock: Mutex<()>,
}

impl ConfigWatcher {
    pub fn new(
        path: PathBuf,
        ctx: Arc<PipelineContext>,
        blocklist: Arc<BlocklistManager>,
        listeners: Arc<ListenerManager>,
    ) -> Self {
        Self { path, ctx, blocklist, listeners, reload_lock: Mutex::new(()) }
    }

    /// Run the poll loop until `shutdown` fires. Reloads are serialized: an
    /// in-progress reload blocks the next tick until it completes.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if let Err(err) = self.tick().await {
            error!(error = %err, "initial config check failed");
        }

        let mut interval = tokio::time::interval(POLL_INTERVAL);
        interval.tick().await; // the immediate startup tick already ran above

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = self.tick().await {
                        error!(error = %err, "config watcher tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("config watcher shutting down");
                    return;
                }
            }
        }
    }

    async fn tick(&self) -> Result<()> {
        let _guard = self.reload_lock.lock().await;

        let bytes = tokio::fs::read(&self.path).await.map_err(Error::Io)?;
        let hash = hash_bytes(&bytes);

        let persisted = self.ctx.storage.get_setting(CONFIG_HASH_KEY).await?;
        if persisted.as_deref() == Some(hash.as_str()) {
            return Ok(());
        }

        let new_config: Config =
            serde_yaml::from_slice(&bytes).map_err(|err| Error::ConfigInvalid(err.to_string()))?;
        new_config.validate()?;

        let reload_flag = new_config.adsblock.reload;
        self.ctx.set_config(new_config.clone());
        self.blocklist.refresh(reload_flag, self.ctx.storage.as_ref()).await;

        if let Err(err) = self.listeners.recreate(&new_config, self.ctx.clone()).await {
            warn!(error = %err, "failed to recreate listeners after config reload");
        }

        self.ctx.storage.upsert_setting(CONFIG_HASH_KEY, &hash).await?;
        info!(hash = %hash, "config reloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResponseCache;
    use crate::storage::{SqliteStorage, Storage};
    use std::io::Write;

    #[test]
    fn hash_bytes_is_deterministic_and_sensitive_to_content() {
        let a = hash_bytes(b"cache:\n  max_size: 1000\n");
        let b = hash_bytes(b"cache:\n  max_size: 1000\n");
        let c = hash_bytes(b"cache:\n  max_size: 2000\n");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn matching_persisted_hash_skips_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let contents = b"cache:\n  max_size: 1000\n";
        std::fs::File::create(&config_path).unwrap().write_all(contents).unwrap();

        let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::connect(":memory:").await.unwrap());
        storage.upsert_setting(CONFIG_HASH_KEY, &hash_bytes(contents)).await.unwrap();
        storage.flush().await.unwrap();

        let cache = Arc::new(ResponseCache::new(10, Duration::from_secs(60)));
        let blocklist = Arc::new(BlocklistManager::new(&[], &[], &[]));
        let ctx = PipelineContext::new(cache, blocklist.clone(), storage, Config::default(), "host");
        let listeners = Arc::new(ListenerManager::new());

        let watcher = ConfigWatcher::new(config_path, ctx.clone(), blocklist, listeners);
        watcher.tick().await.unwrap();

        // Same config, still equal to the persisted hash: the live config
        // object must remain the untouched default.
        assert_eq!(ctx.config().cache.max_size, 1000);
    }
}
