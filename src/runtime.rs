use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{error, info, warn};

use crate::gateway::{GatewayServer, Transcoder};
use crate::proto::auth_server::Auth;
use crate::server::{AuthServiceImpl, RpcServer, ServerConfig};
use crate::{Error, Result};

/// Runs the gRPC listener and the HTTP gateway side by side.
///
/// Both sockets are bound by [`Supervisor::bind`], so a port conflict is
/// reported before anything starts serving.
#[derive(Debug)]
pub struct Supervisor<S = AuthServiceImpl> {
    rpc: RpcServer,
    gateway: GatewayServer,
    transcoder: Transcoder,
    service: S,
}

impl Supervisor<AuthServiceImpl> {
    /// Binds the gRPC listener, then the gateway listener, and prepares the
    /// gateway's loopback channel.
    ///
    /// # Errors
    /// Returns [`Error::Bind`] if either address is taken,
    /// [`Error::Config`] for unusable settings, or [`Error::Transport`] if
    /// the upstream endpoint is not a valid URI.
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let rpc = RpcServer::bind(config.grpc.addr()?).await?;
        let gateway = GatewayServer::bind(config.gateway.listener().addr()?).await?;

        let upstream = config.upstream_endpoint(rpc.local_addr());
        let rpc_timeout = (config.gateway.rpc_timeout_ms > 0)
            .then(|| Duration::from_millis(config.gateway.rpc_timeout_ms));

        let transcoder = Transcoder::connect(&upstream)?
            .with_max_body_bytes(config.gateway.max_body_bytes)
            .with_rpc_timeout(rpc_timeout);

        info!(%upstream, "gateway upstream configured");

        Ok(Self {
            rpc,
            gateway,
            transcoder,
            service: AuthServiceImpl::new(),
        })
    }
}

impl<S: Auth> Supervisor<S> {
    /// Serves `service` on the gRPC listener instead of the default one.
    pub fn with_service<T: Auth>(self, service: T) -> Supervisor<T> {
        Supervisor {
            rpc: self.rpc,
            gateway: self.gateway,
            transcoder: self.transcoder,
            service,
        }
    }

    pub fn grpc_addr(&self) -> SocketAddr {
        self.rpc.local_addr()
    }

    pub fn gateway_addr(&self) -> SocketAddr {
        self.gateway.local_addr()
    }

    /// Runs both listeners until `shutdown` completes or one of them exits.
    ///
    /// Whichever happens first stops the other listener. The error of the
    /// listener that exited first is returned ahead of the other's.
    ///
    /// # Errors
    /// Returns the listener's error, or [`Error::TaskFailed`] if its task
    /// panicked.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (stop_tx, stop_rx) = watch::channel(false);

        let mut grpc = tokio::spawn(
            self.rpc
                .serve(self.service, wait_for_shutdown(stop_rx.clone())),
        );
        let mut gateway = tokio::spawn(
            self.gateway
                .serve(self.transcoder, wait_for_shutdown(stop_rx)),
        );

        let (first, second) = tokio::select! {
            _ = shutdown => {
                info!("Shutdown requested, stopping listeners");
                let _ = stop_tx.send(true);
                (joined("grpc", grpc.await), joined("gateway", gateway.await))
            }
            res = &mut grpc => {
                let res = joined("grpc", res);
                warn!("gRPC listener exited, stopping gateway");
                let _ = stop_tx.send(true);
                (res, joined("gateway", gateway.await))
            }
            res = &mut gateway => {
                let res = joined("gateway", res);
                warn!("HTTP gateway exited, stopping gRPC listener");
                let _ = stop_tx.send(true);
                (res, joined("grpc", grpc.await))
            }
        };

        for result in [&first, &second] {
            if let Err(e) = result {
                error!("Listener failed: {e}");
            }
        }

        info!("All listeners stopped");
        first.and(second)
    }
}

fn joined(name: &'static str, res: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    match res {
        Ok(result) => result,
        Err(e) => Err(Error::TaskFailed(name, e.to_string())),
    }
}

/// Resolves once the stop flag is raised or its sender is gone.
async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
