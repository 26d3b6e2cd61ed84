/// HTTP header to call metadata forwarding.
pub mod metadata;

/// Route table mapping HTTP method and path to an RPC.
pub mod routes;

/// gRPC status and gateway failure mapping to HTTP responses.
pub mod error_mapping;

/// Request and response transcoding.
pub mod transcoder;

/// HTTP/1.1 listener.
pub mod http;

pub use error_mapping::{ErrorBody, GatewayError};
pub use http::GatewayServer;
pub use metadata::{ForwardMetadata, ForwardMetadataLayer, MetadataCarrier};
pub use routes::{BodyBinding, Route, RouteTable, RpcMethod};
pub use transcoder::Transcoder;
