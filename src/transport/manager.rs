//! Listener orchestration: binds the three transports, and supports
//! recreating them in place on a config reload (SPEC_FULL.md §4.5) — bind the
//! new socket, swap over, close the old one.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::Config;
use crate::pipeline::PipelineContext;
use crate::transport::{dot, tls, udp};

/// One generation of bound listeners. Dropping this (after its shutdown
/// signal fires) tears down every task; `ListenerManager::recreate` replaces
/// it wholesale.
pub struct ListenerSet {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ListenerSet {
    pub async fn bind(config: &Config, ctx: Arc<PipelineContext>) -> std::io::Result<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        let udp_addr = SocketAddr::from((config.dns.hostname, config.dns.port));
        let udp_socket = udp::bind(udp_addr, shutdown_rx.clone()).await?;
        info!(addr = %udp_addr, "udp listener bound");
        let udp_ctx = ctx.clone();
        let udp_shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            udp::serve(udp_socket, udp_ctx, udp_shutdown).await;
        }));

        let dot_addr = SocketAddr::from((config.dot.hostname, config.dot.port));
        let dot_listener = TcpListener::bind(dot_addr).await?;
        let acceptor = tls::build_acceptor(&config.ssl.certfile, &config.ssl.keyfile)
            .map_err(|err| std::io::Error::other(err.to_string()))?;
        info!(addr = %dot_addr, "dot listener bound");
        let dot_ctx = ctx.clone();
        let dot_shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            dot::serve(dot_listener, acceptor, dot_ctx, dot_shutdown).await;
        }));

        let doh_addr = SocketAddr::from((config.doh.hostname, config.doh.port));
        let doh_ctx = ctx.clone();
        let doh_shutdown = shutdown_rx.clone();
        let certfile = config.ssl.certfile.clone();
        let keyfile = config.ssl.keyfile.clone();
        info!(addr = %doh_addr, "doh listener starting");
        tasks.push(tokio::spawn(async move {
            if let Err(err) =
                crate::transport::doh::serve(doh_addr, &certfile, &keyfile, doh_ctx, doh_shutdown).await
            {
                error!(error = %err, "doh listener exited with error");
            }
        }));

        Ok(Self { shutdown_tx, tasks })
    }

    /// Signal all listeners to stop accepting and await their tasks, up to
    /// the given grace period.
    pub async fn shutdown(self, grace: std::time::Duration) {
        let _ = self.shutdown_tx.send(true);
        let _ = tokio::time::timeout(grace, futures::future::join_all(self.tasks)).await;
    }
}

pub struct ListenerManager {
    current: tokio::sync::Mutex<Option<ListenerSet>>,
}

impl ListenerManager {
    pub fn new() -> Self {
        Self { current: tokio::sync::Mutex::new(None) }
    }

    pub async fn start(&self, config: &Config, ctx: Arc<PipelineContext>) -> std::io::Result<()> {
        let set = ListenerSet::bind(config, ctx).await?;
        *self.current.lock().await = Some(set);
        Ok(())
    }

    /// Bind a fresh listener set on the new config, then tear down the old
    /// one. In-flight requests against the old set finish on their own since
    /// `shutdown` only stops accepting new connections.
    pub async fn recreate(&self, config: &Config, ctx: Arc<PipelineContext>) -> std::io::Result<()> {
        let new_set = ListenerSet::bind(config, ctx).await?;
        let old_set = self.current.lock().await.replace(new_set);
        if let Some(old_set) = old_set {
            old_set.shutdown(std::time::Duration::from_secs(9)).await;
        }
        Ok(())
    }

    pub async fn shutdown(&self, grace: std::time::Duration) {
        if let Some(set) = self.current.lock().await.take() {
            set.shutdown(grace).await;
        }
    }
}

impl Default for ListenerManager {
    fn default() -> Self {
        Self::new()
    }
}
