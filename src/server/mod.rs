/// `pb.Auth` service implementation.
pub mod service;

/// gRPC listener.
pub mod rpc;

/// Process configuration.
pub mod config;

pub use config::{GatewaySettings, ListenerSettings, MetricsSettings, ServerConfig};
pub use rpc::RpcServer;
pub use service::AuthServiceImpl;
