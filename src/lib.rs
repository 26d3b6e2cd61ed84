//! # authgate
//!
//! One `Auth` service exposed twice: natively over gRPC, and through a
//! JSON-over-HTTP gateway that transcodes each HTTP request into a gRPC call
//! made over a loopback connection to the same process.
//!
//! - [`proto`]: the `pb.Auth` service contract and its JSON mapping
//! - [`server`]: the service implementation, gRPC listener, and configuration
//! - [`gateway`]: header forwarding, route table, and the HTTP transcoder
//! - [`runtime`]: runs both listeners as supervised tasks
//!
//! ```rust,no_run
//! use authgate::{ServerConfig, Supervisor};
//!
//! # async fn run() -> authgate::Result<()> {
//! let config = ServerConfig::default();
//! let supervisor = Supervisor::bind(&config).await?;
//! supervisor.run(async { let _ = tokio::signal::ctrl_c().await; }).await
//! # }
//! ```

/// Error types.
pub mod error;

/// `pb.Auth` messages plus gRPC server and client glue.
pub mod proto;

/// JSON/HTTP to gRPC transcoding gateway.
pub mod gateway;

/// gRPC server side: service implementation, listener, configuration.
pub mod server;

/// Process composition.
pub mod runtime;

pub use error::Error;
pub use gateway::{GatewayServer, MetadataCarrier, Transcoder};
pub use runtime::Supervisor;
pub use server::{AuthServiceImpl, RpcServer, ServerConfig};

/// Result type alias for authgate operations.
pub type Result<T> = std::result::Result<T, Error>;
