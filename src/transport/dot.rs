//! DNS-over-TLS listener on TCP+TLS/853 (SPEC_FULL.md §4.4): each message is
//! length-prefixed by a big-endian 16-bit length, per RFC 7858.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, warn};

use crate::pipeline::{PipelineContext, ResolverPipeline};

pub async fn serve(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    ctx: Arc<PipelineContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    let pipeline = Arc::new(ResolverPipeline::new(ctx));

    loop {
        let accepted = tokio::select! {
            result = listener.accept() => result,
            _ = shutdown.changed() => {
                debug!("dot listener shutting down");
                return;
            }
        };

        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(err) => {
                warn!(error = %err, "dot accept error, continuing");
                continue;
            }
        };

        let acceptor = acceptor.clone();
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            match acceptor.accept(stream).await {
                Ok(tls_stream) => handle_connection(tls_stream, peer, pipeline).await,
                Err(err) => warn!(%peer, error = %err, "dot tls handshake failed"),
            }
        });
    }
}

async fn handle_connection<S>(mut stream: S, peer: SocketAddr, pipeline: Arc<ResolverPipeline>)
where
    S: AsyncReadExt + AsyncWriteExt + Unpin,
{
    loop {
        let mut len_buf = [0u8; 2];
        match stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!(%peer, "dot client closed connection");
                return;
            }
            Err(err) => {
                warn!(%peer, error = %err, "dot read error, closing connection");
                return;
            }
        }

        let len = u16::from_be_bytes(len_buf) as usize;
        let mut message = vec![0u8; len];
        if let Err(err) = stream.read_exact(&mut message).await {
            warn!(%peer, error = %err, "dot read error, closing connection");
            return;
        }

        let response = pipeline.handle(&message).await;
        let mut framed = Vec::with_capacity(2 + response.len());
        framed.extend_from_slice(&(response.len() as u16).to_be_bytes());
        framed.extend_from_slice(&response);

        if let Err(err) = stream.write_all(&framed).await {
            warn!(%peer, error = %err, "dot write error, closing connection");
            return;
        }
    }
}
