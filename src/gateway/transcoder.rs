//! HTTP/JSON to gRPC transcoding for `pb.Auth`.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use metrics::{counter, histogram};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tonic::transport::{Channel, Endpoint};
use tower::Service;
use tracing::{debug, error, warn};

use super::error_mapping::{GatewayError, json_response};
use super::metadata::MetadataCarrier;
use super::routes::{BodyBinding, RouteTable, RpcMethod};
use crate::proto::auth_client::AuthClient;
use crate::proto::{GetUserRequest, UserRequest};
use crate::{Error, Result};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Default cap on request bodies.
pub const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Translates HTTP requests into `pb.Auth` calls and their results back into
/// JSON.
///
/// Cloning is cheap: clones share the gRPC channel and the route table, so
/// one transcoder serves any number of concurrent requests.
#[derive(Clone, Debug)]
pub struct Transcoder {
    client: AuthClient<Channel>,
    routes: Arc<RouteTable>,
    max_body_bytes: usize,
    rpc_timeout: Option<Duration>,
}

impl Transcoder {
    /// Creates a transcoder over an existing channel with the `pb.Auth`
    /// routes.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the route table cannot be built.
    pub fn new(channel: Channel) -> Result<Self> {
        let routes = RouteTable::auth()
            .map_err(|e| Error::Config(format!("invalid route table: {e}")))?;

        Ok(Self {
            client: AuthClient::new(channel),
            routes: Arc::new(routes),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            rpc_timeout: None,
        })
    }

    /// Creates a transcoder with a plaintext channel to `endpoint`. The
    /// connection is opened on first use and re-established if it drops.
    ///
    /// # Errors
    /// Returns [`Error::Transport`] if `endpoint` is not a valid URI.
    pub fn connect(endpoint: &str) -> Result<Self> {
        let channel = Endpoint::from_shared(endpoint.to_string())?.connect_lazy();
        Self::new(channel)
    }

    /// Sets the largest accepted request body.
    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Sets a deadline for each upstream call; `None` lets calls run to
    /// completion.
    pub fn with_rpc_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Serves one request. Always produces a response; failures become JSON
    /// error bodies.
    ///
    /// Dropping the returned future (the client went away) drops the
    /// in-flight gRPC call with it.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let start = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let response = match self.transcode(req).await {
            Ok(response) => response,
            Err(e) => {
                let status = e.status_code();
                if status.is_server_error() {
                    error!(%method, %path, %status, "gateway request failed: {e}");
                } else {
                    warn!(%method, %path, %status, "gateway request rejected: {e}");
                }
                counter!("gateway.errors").increment(1);
                e.into_response()
            }
        };

        histogram!("gateway.request.duration").record(start.elapsed().as_secs_f64());
        debug!(%method, %path, status = %response.status(), "gateway request served");

        response
    }

    async fn transcode<B>(&self, req: Request<B>) -> std::result::Result<Response<Full<Bytes>>, GatewayError>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();

        let matched = self.routes.resolve(&parts.method, parts.uri.path())?;
        let rpc = matched.route.rpc;
        counter!("gateway.requests", "rpc" => rpc.name()).increment(1);

        let carrier = parts
            .extensions
            .get::<MetadataCarrier>()
            .cloned()
            .unwrap_or_else(|| MetadataCarrier::from_headers(&parts.headers));

        let body = match matched.route.body {
            BodyBinding::Whole => read_body(body, self.max_body_bytes).await?,
            BodyBinding::None => Bytes::new(),
        };

        let fields = request_fields(&matched.params, parts.uri.query(), &body)?;
        debug!(rpc = rpc.name(), "transcoding request");

        let mut client = self.client.clone();
        let json = match rpc {
            RpcMethod::Login => {
                let message: UserRequest = decode_message(fields)?;
                let response = client.login(self.outgoing(message, &carrier)).await?;
                encode_message(response.get_ref())?
            }
            RpcMethod::GetUser => {
                let message: GetUserRequest = decode_message(fields)?;
                let response = client.get_user(self.outgoing(message, &carrier)).await?;
                encode_message(response.get_ref())?
            }
        };

        Ok(json_response(StatusCode::OK, json))
    }

    fn outgoing<T>(&self, message: T, carrier: &MetadataCarrier) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        *request.metadata_mut() = carrier.to_metadata_map();
        if let Some(timeout) = self.rpc_timeout {
            request.set_timeout(timeout);
        }
        request
    }
}

impl<B> Service<Request<B>> for Transcoder
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let transcoder = self.clone();
        Box::pin(async move { Ok(transcoder.handle(req).await) })
    }
}

async fn read_body<B>(body: B, limit: usize) -> std::result::Result<Bytes, GatewayError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(GatewayError::PayloadTooLarge { limit }),
        Err(e) => Err(GatewayError::ReadBody(e.to_string())),
    }
}

/// Merges query parameters, the JSON body, and path parameters into one
/// object, later sources overriding earlier ones. An empty body counts as
/// `{}`.
pub fn request_fields(
    params: &[(String, String)],
    query: Option<&str>,
    body: &[u8],
) -> std::result::Result<Value, GatewayError> {
    let mut fields = Map::new();

    if let Some(query) = query {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            fields.insert(key.into_owned(), Value::String(value.into_owned()));
        }
    }

    if !body.iter().all(u8::is_ascii_whitespace) {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(object)) => fields.extend(object),
            Ok(_) => {
                return Err(GatewayError::InvalidBody(
                    "request body must be a JSON object".to_string(),
                ));
            }
            Err(e) => return Err(GatewayError::InvalidBody(e.to_string())),
        }
    }

    for (key, value) in params {
        fields.insert(key.clone(), Value::String(value.clone()));
    }

    Ok(Value::Object(fields))
}

/// Decodes request fields into a message; unknown fields are ignored and
/// missing ones take their zero value.
pub fn decode_message<T: DeserializeOwned>(fields: Value) -> std::result::Result<T, GatewayError> {
    serde_json::from_value(fields).map_err(|e| GatewayError::InvalidRequest(e.to_string()))
}

/// Encodes a response message with declared field names and zero values
/// included.
pub fn encode_message<T: Serialize>(message: &T) -> std::result::Result<Vec<u8>, GatewayError> {
    Ok(serde_json::to_vec(message)?)
}
