//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use authgate::proto::auth_server::Auth;
use authgate::proto::{GetUserRequest, GetUserResponse, UserRequest, UserResponse};
use authgate::{Result, ServerConfig, Supervisor};
use bytes::Bytes;
use http::{HeaderMap, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;
use tonic::metadata::MetadataMap;
use tonic::{Response, Status};

/// Initialize test tracing (call once at the beginning of tests).
///
/// Only logs from the test crate and authgate are shown, filtering out
/// HTTP/2 and tower noise. Subsequent calls are safe and will be ignored.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new("integration_tests=info,authgate=debug");

    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(filter)
        .try_init();
}

/// Configuration with both listeners on ephemeral loopback ports.
pub fn local_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.grpc.host = "127.0.0.1".to_string();
    config.grpc.port = 0;
    config.gateway.host = "127.0.0.1".to_string();
    config.gateway.port = 0;
    config
}

/// A running supervisor and the handles needed to stop it.
pub struct TestStack {
    pub grpc_addr: SocketAddr,
    pub gateway_addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<()>>,
}

impl TestStack {
    pub fn grpc_url(&self) -> String {
        format!("http://{}", self.grpc_addr)
    }

    /// Signals shutdown and waits for both listeners to stop.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        (&mut self.handle).await.expect("supervisor task panicked")
    }
}

/// Starts both listeners with `service` behind the gRPC side.
pub async fn start_stack<S: Auth>(config: ServerConfig, service: S) -> TestStack {
    let supervisor = Supervisor::bind(&config)
        .await
        .expect("Failed to bind listeners")
        .with_service(service);

    let grpc_addr = supervisor.grpc_addr();
    let gateway_addr = supervisor.gateway_addr();

    let (stop, stopped) = oneshot::channel::<()>();
    let handle = tokio::spawn(supervisor.run(async move {
        let _ = stopped.await;
    }));

    TestStack {
        grpc_addr,
        gateway_addr,
        stop: Some(stop),
        handle,
    }
}

/// A buffered HTTP response.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("response body is not JSON")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends one request over a fresh HTTP/1.1 connection.
pub async fn send(addr: SocketAddr, request: Request<Full<Bytes>>) -> HttpResponse {
    let stream = TcpStream::connect(addr)
        .await
        .expect("Failed to connect to gateway");
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .expect("HTTP handshake failed");
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let response = sender
        .send_request(request)
        .await
        .expect("HTTP request failed");
    let (parts, body) = response.into_parts();
    let body = body
        .collect()
        .await
        .expect("Failed to read response body")
        .to_bytes();

    HttpResponse {
        status: parts.status,
        headers: parts.headers,
        body,
    }
}

fn request(
    method: &str,
    addr: SocketAddr,
    path: &str,
    headers: &[(&str, &str)],
    body: Bytes,
) -> Request<Full<Bytes>> {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header("host", addr.to_string());
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder
        .body(Full::new(body))
        .expect("Failed to build request")
}

pub async fn post(
    addr: SocketAddr,
    path: &str,
    body: impl Into<Bytes>,
    headers: &[(&str, &str)],
) -> HttpResponse {
    let mut all = vec![("content-type", "application/json")];
    all.extend_from_slice(headers);
    send(addr, request("POST", addr, path, &all, body.into())).await
}

pub async fn get(addr: SocketAddr, path: &str, headers: &[(&str, &str)]) -> HttpResponse {
    send(addr, request("GET", addr, path, headers, Bytes::new())).await
}

/// `Auth` implementation that records what it receives.
///
/// `Login` answers with the forwarded `authorization` value as the token and
/// fails on a few magic usernames; `GetUser` echoes the requested id.
#[derive(Clone, Default)]
pub struct RecordingAuth {
    calls: Arc<AtomicUsize>,
    metadata: Arc<Mutex<Vec<MetadataMap>>>,
}

impl RecordingAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Metadata of the most recent call.
    pub fn last_metadata(&self) -> Option<MetadataMap> {
        self.metadata.lock().unwrap().last().cloned()
    }

    fn record(&self, metadata: &MetadataMap) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.metadata.lock().unwrap().push(metadata.clone());
    }
}

#[tonic::async_trait]
impl Auth for RecordingAuth {
    async fn login(
        &self,
        request: tonic::Request<UserRequest>,
    ) -> std::result::Result<Response<UserResponse>, Status> {
        self.record(request.metadata());

        match request.get_ref().username.as_str() {
            "denied" => Err(Status::permission_denied("user is locked")),
            "missing" => Err(Status::not_found("no such user")),
            "crash" => Err(Status::internal("db at 10.0.0.7 refused connection")),
            _ => {
                let access_token = request
                    .metadata()
                    .get("authorization")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("none")
                    .to_string();
                Ok(Response::new(UserResponse { access_token }))
            }
        }
    }

    async fn get_user(
        &self,
        request: tonic::Request<GetUserRequest>,
    ) -> std::result::Result<Response<GetUserResponse>, Status> {
        self.record(request.metadata());

        Ok(Response::new(GetUserResponse {
            user_id: request.get_ref().user_id,
        }))
    }
}

/// `Auth` implementation whose `Login` never answers in time.
///
/// Records whether a call started, ran to completion, or was dropped while
/// still pending.
#[derive(Clone, Default)]
pub struct SlowAuth {
    started: Arc<Notify>,
    finished: Arc<AtomicBool>,
    dropped: Arc<AtomicBool>,
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl SlowAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves once a `Login` call is in progress.
    pub async fn started(&self) {
        self.started.notified().await;
    }

    pub fn finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }
}

#[tonic::async_trait]
impl Auth for SlowAuth {
    async fn login(
        &self,
        _request: tonic::Request<UserRequest>,
    ) -> std::result::Result<Response<UserResponse>, Status> {
        let _guard = DropFlag(self.dropped.clone());
        self.started.notify_one();

        tokio::time::sleep(Duration::from_secs(30)).await;
        self.finished.store(true, Ordering::SeqCst);

        Ok(Response::new(UserResponse {
            access_token: "late".to_string(),
        }))
    }

    async fn get_user(
        &self,
        request: tonic::Request<GetUserRequest>,
    ) -> std::result::Result<Response<GetUserResponse>, Status> {
        Ok(Response::new(GetUserResponse {
            user_id: request.get_ref().user_id,
        }))
    }
}
