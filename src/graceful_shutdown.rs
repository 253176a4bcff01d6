//! Graceful shutdown coordinator (SPEC_FULL.md §5): broadcast a shutdown
//! signal, stop accepting new connections, allow in-flight work up to 9s to
//! finish, close listeners, flush the storage collaborator, exit. Each
//! registered component is awaited with its own bounded timeout so one stuck
//! component cannot hang the whole sequence.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::storage::Storage;
use crate::transport::ListenerManager;

const DRAIN_DEADLINE: Duration = Duration::from_secs(9);

type ShutdownResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
type ShutdownFn = Box<dyn Fn() -> tokio::task::JoinHandle<ShutdownResult> + Send + Sync>;

struct ShutdownComponent {
    name: String,
    shutdown_fn: ShutdownFn,
}

pub struct GracefulShutdown {
    components: Mutex<Vec<ShutdownComponent>>,
    listeners: Arc<ListenerManager>,
    storage: Arc<dyn Storage>,
}

impl GracefulShutdown {
    pub fn new(listeners: Arc<ListenerManager>, storage: Arc<dyn Storage>) -> Self {
        Self { components: Mutex::new(Vec::new()), listeners, storage }
    }

    /// Register an additional component (e.g. the config watcher task) for
    /// graceful shutdown beyond the always-present listeners/storage steps.
    pub async fn register_component<F, Fut>(&self, name: impl Into<String>, shutdown_fn: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ShutdownResult> + Send + 'static,
    {
        let component = ShutdownComponent {
            name: name.into(),
            shutdown_fn: Box::new(move || {
                let fut = shutdown_fn();
                tokio::spawn(fut)
            }),
        };
        self.components.lock().await.push(component);
    }

    pub async fn shutdown(&self) {
        info!("graceful shutdown: stopping listeners");
        self.listeners.shutdown(DRAIN_DEADLINE).await;

        let components: Vec<_> = {
            let mut guard = self.components.lock().await;
            guard.drain(..).collect()
        };

        for component in components {
            info!(component = %component.name, "graceful shutdown: stopping component");
            match timeout(DRAIN_DEADLINE, (component.shutdown_fn)()).await {
                Ok(Ok(Ok(()))) => info!(component = %component.name, "component stopped"),
                Ok(Ok(Err(err))) => error!(component = %component.name, error = %err, "component shutdown failed"),
                Ok(Err(err)) => error!(component = %component.name, error = %err, "component shutdown task panicked"),
                Err(_) => warn!(component = %component.name, "component shutdown timed out"),
            }
        }

        info!("graceful shutdown: flushing storage");
        if let Err(err) = timeout(DRAIN_DEADLINE, self.storage.flush()).await {
            warn!(error = %err, "storage flush timed out");
        }

        info!("graceful shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;

    #[tokio::test]
    async fn shutdown_with_no_registered_components_completes() {
        let listeners = Arc::new(ListenerManager::new());
        let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::connect(":memory:").await.unwrap());
        let shutdown = GracefulShutdown::new(listeners, storage);
        shutdown.shutdown().await;
    }

    #[tokio::test]
    async fn a_registered_component_is_invoked_during_shutdown() {
        let listeners = Arc::new(ListenerManager::new());
        let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::connect(":memory:").await.unwrap());
        let shutdown = GracefulShutdown::new(listeners, storage);

        let invoked = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let invoked_clone = invoked.clone();
        shutdown
            .register_component("test-component", move || {
                let invoked = invoked_clone.clone();
                async move {
                    invoked.store(true, std::sync::atomic::Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        shutdown.shutdown().await;
        assert!(invoked.load(std::sync::atomic::Ordering::SeqCst));
    }
}
