//! Forwarding of inbound HTTP headers into gRPC call metadata.

use std::collections::BTreeMap;
use std::task::{Context, Poll};

use http::{HeaderMap, HeaderValue, Request};
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, MetadataMap};
use tower::{Layer, Service};
use tracing::debug;

/// Headers owned by the HTTP/2 transport; forwarding them would corrupt the
/// outgoing call.
const TRANSPORT_HEADERS: &[&str] = &[
    "connection",
    "content-length",
    "content-type",
    "host",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "user-agent",
];

/// Request metadata carried from the HTTP side into the RPC call.
///
/// Keys are lower-cased header names; each key maps to its values in arrival
/// order. Values are kept as the raw header bytes. Built once per request by
/// [`ForwardMetadata`] and stored in the request extensions, where downstream
/// layers only read it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetadataCarrier {
    entries: BTreeMap<String, Vec<Vec<u8>>>,
}

impl MetadataCarrier {
    /// Creates an empty carrier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies every header into a carrier.
    ///
    /// Each header name yields exactly one entry whose single value is the
    /// header's values joined with `", "`, the standard combination for
    /// repeated HTTP fields. Bytes are copied unchanged.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut carrier = Self::new();

        for name in headers.keys() {
            let joined = headers
                .get_all(name)
                .iter()
                .map(HeaderValue::as_bytes)
                .collect::<Vec<_>>()
                .join(&b", "[..]);
            carrier.insert(name.as_str(), joined);
        }

        carrier
    }

    /// Appends `value` under the lower-cased `key`.
    pub fn insert(&mut self, key: &str, value: impl Into<Vec<u8>>) {
        self.entries
            .entry(key.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// First value stored under `key`, looked up case-insensitively.
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.get_all(key).first().map(Vec::as_slice)
    }

    /// First value under `key` if it is valid UTF-8.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|value| std::str::from_utf8(value).ok())
    }

    /// All values stored under `key`, looked up case-insensitively.
    pub fn get_all(&self, key: &str) -> &[Vec<u8>] {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Iterates keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterates `(key, values)` pairs in sorted key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Vec<u8>])> {
        self.entries
            .iter()
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds the metadata for an outgoing gRPC call.
    ///
    /// Transport headers, reserved `grpc-*` keys, and binary (`-bin`) keys are
    /// left out. So are values holding anything but visible ASCII, spaces and
    /// tabs; forwarded values are byte-exact copies.
    pub fn to_metadata_map(&self) -> MetadataMap {
        let mut map = MetadataMap::new();

        for (key, values) in self.iter() {
            if !is_forwardable(key) {
                continue;
            }

            let Ok(metadata_key) = AsciiMetadataKey::from_bytes(key.as_bytes()) else {
                debug!(key, "skipping header with invalid metadata key");
                continue;
            };

            for value in values {
                if !is_ascii_metadata(value) {
                    debug!(key, "skipping header with non-ASCII value");
                    continue;
                }

                match AsciiMetadataValue::try_from(value.as_slice()) {
                    Ok(value) => {
                        map.append(metadata_key.clone(), value);
                    }
                    Err(_) => debug!(key, "skipping header with invalid metadata value"),
                }
            }
        }

        map
    }
}

fn is_ascii_metadata(value: &[u8]) -> bool {
    value
        .iter()
        .all(|&b| b == b'\t' || (0x20..0x7f).contains(&b))
}

fn is_forwardable(key: &str) -> bool {
    !TRANSPORT_HEADERS.contains(&key) && !key.starts_with("grpc-") && !key.ends_with("-bin")
}

/// Layer that attaches a [`MetadataCarrier`] to every request.
#[derive(Clone, Copy, Debug, Default)]
pub struct ForwardMetadataLayer;

impl<S> Layer<S> for ForwardMetadataLayer {
    type Service = ForwardMetadata<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ForwardMetadata { inner }
    }
}

/// Middleware produced by [`ForwardMetadataLayer`].
///
/// Rebuilds each request from its parts with the carrier added to the
/// extensions and calls the wrapped service exactly once. Never fails on its
/// own; a request without headers carries an empty carrier.
#[derive(Clone, Debug)]
pub struct ForwardMetadata<S> {
    inner: S,
}

impl<S> ForwardMetadata<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S, B> Service<Request<B>> for ForwardMetadata<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let carrier = MetadataCarrier::from_headers(req.headers());
        let (mut parts, body) = req.into_parts();
        parts.extensions.insert(carrier);
        self.inner.call(Request::from_parts(parts, body))
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use http::HeaderName;
    use tower::{ServiceExt, service_fn};

    use super::*;

    #[test]
    fn empty_headers_give_empty_carrier() {
        let carrier = MetadataCarrier::from_headers(&HeaderMap::new());
        assert!(carrier.is_empty());
        assert!(carrier.to_metadata_map().is_empty());
    }

    #[test]
    fn keys_are_lower_cased_and_complete() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_bytes(b"Authorization").unwrap(),
            HeaderValue::from_static("Bearer abc"),
        );
        headers.insert(
            HeaderName::from_bytes(b"X-Request-Id").unwrap(),
            HeaderValue::from_static("42"),
        );

        let carrier = MetadataCarrier::from_headers(&headers);

        assert_eq!(
            carrier.keys().collect::<Vec<_>>(),
            vec!["authorization", "x-request-id"]
        );
        assert_eq!(carrier.get_str("AUTHORIZATION"), Some("Bearer abc"));
        assert_eq!(carrier.get("x-request-id"), Some(&b"42"[..]));
    }

    #[test]
    fn repeated_headers_are_joined_in_order() {
        let mut headers = HeaderMap::new();
        headers.append("x-tag", HeaderValue::from_static("a"));
        headers.append("x-tag", HeaderValue::from_static("b"));

        let carrier = MetadataCarrier::from_headers(&headers);

        assert_eq!(carrier.get_all("x-tag"), &[b"a, b".to_vec()]);
    }

    #[test]
    fn metadata_map_skips_transport_and_reserved_keys() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert("host", HeaderValue::from_static("localhost:9000"));
        headers.insert("grpc-timeout", HeaderValue::from_static("1S"));
        headers.insert("trace-bin", HeaderValue::from_static("AAEC"));
        headers.insert("authorization", HeaderValue::from_static("Bearer abc"));

        let map = MetadataCarrier::from_headers(&headers).to_metadata_map();

        assert_eq!(map.len(), 1);
        assert_eq!(
            map.get("authorization").and_then(|v| v.to_str().ok()),
            Some("Bearer abc")
        );
    }

    #[test]
    fn metadata_map_skips_non_ascii_values() {
        let mut carrier = MetadataCarrier::new();
        carrier.insert("x-name", "caf\u{e9}");
        carrier.insert("x-ctl", &b"a\x01b"[..]);
        carrier.insert("x-ok", "plain\tvalue");

        let map = carrier.to_metadata_map();

        assert!(map.get("x-name").is_none());
        assert!(map.get("x-ctl").is_none());
        assert_eq!(map.get("x-ok").unwrap(), "plain\tvalue");
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn non_utf8_header_bytes_are_kept_exactly() {
        let mut headers = HeaderMap::new();
        headers.insert("x-name", HeaderValue::from_bytes(b"caf\xe9").unwrap());

        let carrier = MetadataCarrier::from_headers(&headers);

        assert_eq!(carrier.get("x-name"), Some(&b"caf\xe9"[..]));
        assert_eq!(carrier.get_str("x-name"), None);
        assert!(carrier.to_metadata_map().get("x-name").is_none());
    }

    #[tokio::test]
    async fn layer_attaches_carrier_and_calls_inner_once() {
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let seen = calls.clone();

        let inner = service_fn(move |req: Request<()>| {
            seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let carrier = req.extensions().get::<MetadataCarrier>().cloned();
            async move { Ok::<_, Infallible>(carrier) }
        });

        let request = Request::builder()
            .header("X-Api-Key", "secret")
            .body(())
            .unwrap();

        let carrier = ForwardMetadataLayer
            .layer(inner)
            .oneshot(request)
            .await
            .unwrap()
            .expect("carrier attached");

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(carrier.get_str("x-api-key"), Some("secret"));
        assert_eq!(carrier.len(), 1);
    }
}
