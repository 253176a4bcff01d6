//! Classic UDP/53 DNS listener (SPEC_FULL.md §4.4).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::pipeline::PipelineContext;
use crate::pipeline::ResolverPipeline;

const BIND_RETRY_DELAY: Duration = Duration::from_secs(3);

pub async fn bind(addr: SocketAddr, mut shutdown: watch::Receiver<bool>) -> std::io::Result<UdpSocket> {
    loop {
        match UdpSocket::bind(addr).await {
            Ok(socket) => return Ok(socket),
            Err(err) => {
                error!(%addr, error = %err, "udp bind failed, retrying in 3s");
                tokio::select! {
                    _ = tokio::time::sleep(BIND_RETRY_DELAY) => {}
                    _ = shutdown.changed() => {
                        return Err(err);
                    }
                }
            }
        }
    }
}

/// Serve UDP queries on `socket` until `shutdown` fires. Receive errors are
/// logged and the loop continues — the source's documented pitfall is an
/// ICMP port-unreachable from a client crashing the whole socket.
pub async fn serve(socket: UdpSocket, ctx: Arc<PipelineContext>, mut shutdown: watch::Receiver<bool>) {
    let socket = Arc::new(socket);
    let pipeline = Arc::new(ResolverPipeline::new(ctx));
    let mut buf = vec![0u8; 65535];

    loop {
        let recv = tokio::select! {
            result = socket.recv_from(&mut buf) => result,
            _ = shutdown.changed() => {
                debug!("udp listener shutting down");
                return;
            }
        };

        let (len, peer) = match recv {
            Ok(pair) => pair,
            Err(err) => {
                warn!(error = %err, "udp receive error, continuing");
                continue;
            }
        };

        let query = buf[..len].to_vec();
        let socket = socket.clone();
        let pipeline = pipeline.clone();

        tokio::spawn(async move {
            let response = pipeline.handle(&query).await;
            if let Err(err) = socket.send_to(&response, peer).await {
                warn!(%peer, error = %err, "udp send failed, dropping response");
            }
        });
    }
}
