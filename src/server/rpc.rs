use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic_health::server::health_reporter;
use tracing::info;

use crate::proto::auth_server::{Auth, AuthServer};
use crate::{Error, Result};

/// gRPC listener for `pb.Auth`.
///
/// Owns its socket from [`RpcServer::bind`] until [`RpcServer::serve`]
/// returns, so the port is released when serving ends or the value is dropped.
#[derive(Debug)]
pub struct RpcServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl RpcServer {
    /// Binds the listener.
    ///
    /// # Errors
    /// Returns [`Error::Bind`] if the address cannot be bound.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        info!("gRPC listener bound on {local_addr}");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Address the listener is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves `service` (plus the standard gRPC health service) until
    /// `shutdown` completes. Each call runs on its own task.
    ///
    /// # Errors
    /// Returns [`Error::Transport`] if the server fails.
    pub async fn serve<S, F>(self, service: S, shutdown: F) -> Result<()>
    where
        S: Auth,
        F: Future<Output = ()> + Send,
    {
        let (mut reporter, health_service) = health_reporter();
        reporter.set_serving::<AuthServer<S>>().await;

        let local_addr = self.local_addr;
        let incoming = TcpListenerStream::new(self.listener);

        info!("gRPC server listening on {local_addr}");

        Server::builder()
            .add_service(health_service)
            .add_service(AuthServer::new(service))
            .serve_with_incoming_shutdown(incoming, async move {
                shutdown.await;
                reporter.set_not_serving::<AuthServer<S>>().await;
                info!("gRPC server on {local_addr} shutting down");
            })
            .await?;

        Ok(())
    }
}
