use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tower::ServiceBuilder;
use tracing::{debug, error, info};

use super::metadata::ForwardMetadataLayer;
use super::transcoder::Transcoder;
use crate::{Error, Result};

/// HTTP/1.1 listener for the JSON gateway.
///
/// Owns its socket from [`GatewayServer::bind`] until
/// [`GatewayServer::serve`] returns.
#[derive(Debug)]
pub struct GatewayServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl GatewayServer {
    /// Binds the listener.
    ///
    /// # Errors
    /// Returns [`Error::Bind`] if the address cannot be bound.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        info!("HTTP gateway bound on {local_addr}");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Address the listener is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until `shutdown` completes, then lets open
    /// connections finish their in-flight requests before returning.
    ///
    /// Every connection runs on its own task through the metadata forwarder
    /// and `transcoder`.
    pub async fn serve<F>(self, transcoder: Transcoder, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let service = ServiceBuilder::new()
            .layer(ForwardMetadataLayer)
            .service(transcoder);

        let (close_tx, close_rx) = watch::channel(false);
        let mut connections = JoinSet::new();
        let mut shutdown = std::pin::pin!(shutdown);

        info!("HTTP gateway listening on {}", self.local_addr);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                accepted = self.listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!("Failed to accept connection: {e}");
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            continue;
                        }
                    };

                    let io = TokioIo::new(stream);
                    let service = TowerToHyperService::new(service.clone());
                    let mut close_rx = close_rx.clone();

                    connections.spawn(async move {
                        let conn = http1::Builder::new().serve_connection(io, service);
                        let mut conn = std::pin::pin!(conn);
                        let mut closing = false;

                        loop {
                            tokio::select! {
                                res = conn.as_mut() => {
                                    if let Err(e) = res {
                                        debug!("Error serving connection from {remote_addr}: {e}");
                                    }
                                    break;
                                }
                                _ = close_rx.changed(), if !closing => {
                                    closing = true;
                                    conn.as_mut().graceful_shutdown();
                                }
                            }
                        }
                    });
                }
            }
        }

        info!("HTTP gateway on {} shutting down", self.local_addr);
        drop(self.listener);
        let _ = close_tx.send(true);
        while connections.join_next().await.is_some() {}

        Ok(())
    }
}
